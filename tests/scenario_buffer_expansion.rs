//! Spec §8 scenario 6: `spReceiveBuf=32`, release a subproblem whose
//! packed size is `200`. The hub must announce the size via
//! `Hub::buffer_warning_for` before the payload is sent, and a later,
//! smaller dispatch to the same worker must not re-warn.

use parabb::application::Sense;
use parabb::hub::Hub;
use parabb::ids::ProcessId;

#[test]
fn oversized_dispatch_is_preceded_by_a_buffer_warning() {
    let workers = vec![ProcessId(1)];
    let mut hub = Hub::with_receive_buf(ProcessId(0), Sense::Min, &workers, 32);

    let warning = hub.buffer_warning_for(ProcessId(1), 200);
    assert_eq!(warning, Some(200), "a 200-byte payload must grow a 32-byte receive buffer");

    // A later, smaller payload must not trigger a second warning: no
    // tokens are ever dropped by this protocol, only the warning is
    // skipped once the peer's buffer is known to already be big enough.
    let no_warning = hub.buffer_warning_for(ProcessId(1), 100);
    assert_eq!(no_warning, None);

    // A still-larger payload grows the buffer again.
    let grows_again = hub.buffer_warning_for(ProcessId(1), 500);
    assert_eq!(grows_again, Some(500));
}
