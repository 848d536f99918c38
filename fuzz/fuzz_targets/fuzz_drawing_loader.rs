#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode to a well-formed drawing or an error, never a panic.
    if let Ok(drawing) = plotter_core::drawing::Drawing::from_json_slice(data) {
        for stroke in drawing.strokes() {
            assert!(!stroke.samples().is_empty());
        }
        let _ = drawing.to_json_vec();
    }
});
