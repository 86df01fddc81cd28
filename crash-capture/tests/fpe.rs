mod shared;

use mayhem_generator::Mayhem;

#[test]
fn captures_fpe() {
    shared::capture_artifact(Mayhem::DivideByZero, crash_capture::Signal::Fpe);
}
