//! Lightweight surrogate a hub holds in place of a subproblem it does not
//! own (spec §3).

use crate::ids::Address;
use serde::{Deserialize, Serialize};

/// What a token entitles its holder to materialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    /// Returns authority over the subproblem itself to whoever receives
    /// this token.
    SelfToken,
    /// The receiver materializes any not-yet-made child.
    AnyChild,
    /// The receiver materializes specifically child `k`.
    SpecificChild(usize),
}

/// A small proxy for a subproblem held by a hub to enable load balancing
/// without moving the subproblem itself. For every live token there must
/// exist a live subproblem at `address.home` with `token_count > 0`
/// (spec §3 invariant) — callers are responsible for keeping that true
/// when they create or drop a `Token`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    /// Bound snapshot at the time the token was created; may go stale as
    /// the owning process keeps working the subproblem.
    pub bound: f64,
    pub kind: TokenKind,
    /// How many child deliveries this token is worth (> 1 for a batched
    /// `AnyChild` release covering several remaining children at once).
    pub multiplicity: u32,
    /// Insertion sequence, used to break TokenPool ties by arrival order.
    pub sequence: u64,
    /// The subproblem packed by `Application::pack` at release time.
    ///
    /// The spec's data model describes a token as a pure surrogate that
    /// leaves the subproblem resident at `homeProcessor` until the token
    /// is actually redeemed, at which point the origin ships it to the
    /// dispatch destination. This implementation packs eagerly at release
    /// instead, so the hub can forward a token on dispatch without an
    /// extra origin-worker round trip over the hub's relay channel
    /// (DESIGN.md, resolving the wire-format/transport Open Question).
    pub payload: Vec<u8>,
}
