mod shared;

use mayhem_generator::Mayhem;

#[test]
fn captures_trap() {
    shared::capture_artifact(Mayhem::Trap, crash_capture::Signal::Trap);
}
