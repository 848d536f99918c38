use plotter_core::{
    Corner, Drawing, MachineConfig, MotionState, OriginState, PacingConfig, Sample, Stroke,
    encode, to_input, to_physical, to_steps,
};
use proptest::prelude::*;

fn corner() -> impl Strategy<Value = Corner> {
    prop::sample::select(Corner::ALL.to_vec())
}

fn machine() -> impl Strategy<Value = MachineConfig> {
    (1.0f64..200.0, 10.0f64..500.0, 10.0f64..500.0, 50.0f64..2000.0, 50.0f64..2000.0).prop_map(
        |(spm, w, h, iw, ih)| MachineConfig::new(spm, w, h, iw, ih).unwrap(),
    )
}

proptest! {
    #[test]
    fn physical_then_input_is_identity(
        c in corner(),
        cfg in machine(),
        px in -100.0f64..2100.0,
        py in -100.0f64..2100.0,
    ) {
        let origin = OriginState::detected(c);
        let (x, y) = to_physical(px, py, &origin, &cfg).unwrap();
        let (bx, by) = to_input(x, y, &origin, &cfg).unwrap();
        prop_assert!((bx - px).abs() < 1e-6, "x: {px} -> {bx}");
        prop_assert!((by - py).abs() < 1e-6, "y: {py} -> {by}");
    }

    #[test]
    fn undetected_origin_always_fails(cfg in machine(), px in -1e4f64..1e4, py in -1e4f64..1e4) {
        prop_assert!(to_physical(px, py, &OriginState::unknown(), &cfg).is_err());
    }

    #[test]
    fn quantized_steps_never_overshoot(mm in -1000.0f64..1000.0, spm in 0.1f64..200.0) {
        let steps = f64::from(to_steps(mm, spm));
        prop_assert!(steps.abs() <= (mm * spm).abs());
        prop_assert!((mm * spm - steps).abs() < 1.0);
    }

    // Replaying the encoded moves from the start state lands on the last
    // sample of the last stroke, with the pen up.
    #[test]
    fn encoded_moves_sum_to_final_target(
        strokes in prop::collection::vec(
            prop::collection::vec((0.0f64..150.0, 0.0f64..150.0), 1..6),
            1..5,
        ),
        sx in -500i32..500,
        sy in -500i32..500,
    ) {
        let cfg = MachineConfig::default();
        let drawing = Drawing::from(
            strokes
                .iter()
                .map(|pts| {
                    Stroke::try_from(
                        pts.iter()
                            .map(|&(x, y)| Sample::with_physical(x, y, x, y))
                            .collect::<Vec<_>>(),
                    )
                    .unwrap()
                })
                .collect::<Vec<_>>(),
        );
        let start = MotionState::at(sx, sy);
        let mut end = start;
        let plan = encode(
            &drawing,
            &OriginState::detected(Corner::TopLeft),
            &cfg,
            &PacingConfig::default(),
            &mut end,
        )
        .unwrap();

        let mut replay = start;
        for c in &plan {
            prop_assert!(c.command.steps() != Some(0), "zero move emitted");
            replay.apply(c.command);
        }
        prop_assert_eq!(replay, end);
        let &(lx, ly) = strokes.last().unwrap().last().unwrap();
        prop_assert_eq!(
            (end.x_steps, end.y_steps, end.pen_down),
            (to_steps(lx, cfg.steps_per_mm()), to_steps(ly, cfg.steps_per_mm()), false)
        );
    }
}
