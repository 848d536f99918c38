//! Mapping, quantization and encoding together, as the operator sees them.

use plotter_core::{
    Command, Corner, Drawing, MachineConfig, MotionState, OriginState, PacingConfig,
    PlotterError, Sample, StrokeBuilder, encode, to_steps,
};
use rstest::rstest;

fn tokens(drawing: &Drawing, origin: OriginState, cfg: &MachineConfig) -> Vec<String> {
    let mut st = MotionState::default();
    encode(drawing, &origin, cfg, &PacingConfig::default(), &mut st)
        .unwrap()
        .iter()
        .map(|c| c.command.to_string())
        .collect()
}

fn captured(points: &[(f64, f64)], origin: &OriginState, cfg: &MachineConfig) -> Drawing {
    let mut it = points.iter();
    let &(x0, y0) = it.next().unwrap();
    let mut b = StrokeBuilder::begin(Sample::capture(x0, y0, origin, cfg));
    for &(x, y) in it {
        b.extend(Sample::capture(x, y, origin, cfg));
    }
    Drawing::from(vec![b.finish()])
}

#[test]
fn square_corner_stroke_from_origin() {
    // 600 units over 150 mm = 4 units/mm; 51.2 steps/mm.
    let cfg = MachineConfig::default();
    let origin = OriginState::detected(Corner::TopLeft);
    let d = captured(&[(0.0, 0.0), (40.0, 0.0), (40.0, 40.0)], &origin, &cfg);
    assert_eq!(tokens(&d, origin, &cfg), ["B", "X512", "Y512", "U"]);
}

#[test]
fn truncation_matches_reference_case() {
    assert_eq!(to_steps(9.99, 10.0), 99);
}

#[rstest]
#[case(Corner::TopLeft, ["X5120", "Y2560", "B", "U"])]
#[case(Corner::TopRight, ["X2560", "Y2560", "B", "U"])]
#[case(Corner::BottomLeft, ["X5120", "Y5120", "B", "U"])]
#[case(Corner::BottomRight, ["X2560", "Y5120", "B", "U"])]
fn single_dot_per_corner(#[case] corner: Corner, #[case] expected: [&str; 4]) {
    // (400, 200) input units; 600 x 600 surface at 4 units/mm.
    let cfg = MachineConfig::default();
    let origin = OriginState::detected(corner);
    let d = captured(&[(400.0, 200.0)], &origin, &cfg);
    assert_eq!(tokens(&d, origin, &cfg), expected);
}

#[test]
fn uncalibrated_capture_cannot_be_encoded_until_remapped() {
    let cfg = MachineConfig::default();
    let mut d = captured(&[(0.0, 0.0), (40.0, 0.0)], &OriginState::unknown(), &cfg);
    let origin = OriginState::detected(Corner::TopLeft);

    let mut st = MotionState::default();
    assert_eq!(
        encode(&d, &origin, &cfg, &PacingConfig::default(), &mut st),
        Err(PlotterError::OriginNotCalibrated)
    );
    d.remap(&origin, &cfg).unwrap();
    assert_eq!(tokens(&d, origin, &cfg), ["B", "X512", "U"]);
}

#[test]
fn steps_per_mm_only_changes_step_counts() {
    let origin = OriginState::detected(Corner::TopLeft);
    let coarse = MachineConfig::new(10.0, 150.0, 150.0, 600.0, 600.0).unwrap();
    let d = captured(&[(4.0, 0.0), (8.0, 4.0)], &origin, &coarse);
    assert_eq!(tokens(&d, origin, &coarse), ["X10", "B", "X10", "Y10", "U"]);
    let moves: Vec<i32> = {
        let mut st = MotionState::default();
        encode(&d, &origin, &coarse, &PacingConfig::default(), &mut st)
            .unwrap()
            .iter()
            .filter_map(|c| c.command.steps())
            .collect()
    };
    assert_eq!(moves, [10, 10, 10]);
    assert!(!moves.contains(&0));
    assert_eq!("X10".parse::<Command>().unwrap(), Command::MoveX(10));
}
