use uhfscan::*;

const TOLERANCE: f64 = 1e-9;

fn us_only() -> ChannelPlan {
    ChannelPlan::new([Band::new(2, "US", 902.75, 0.5, 0, 49).unwrap()]).unwrap()
}

#[test]
fn test_frequency_for_index_matches_band_formula() {
    let plan = ChannelPlan::regulatory();
    for band in plan.bands() {
        for n in band.min_index()..=band.max_index() {
            let expected = band.start_mhz() + f64::from(n) * band.step_mhz();
            assert!(
                (frequency_for_index(band, n) - expected).abs() < TOLERANCE,
                "band {} index {}",
                band.id(),
                n
            );
        }
    }
}

#[test]
fn test_us_band_range_resolution() {
    let selection = us_only().resolve_by_range(902.0, 907.5).unwrap();

    assert_eq!(selection.band_id(), 2);
    assert_eq!(selection.min_index(), 0);
    assert_eq!(selection.max_index(), 9);
    assert!((selection.min_frequency() - 902.75).abs() < TOLERANCE);
    assert!((selection.max_frequency() - 907.25).abs() < TOLERANCE);
}

#[test]
fn test_full_registry_picks_band_with_most_channels() {
    // US 3 starts at 902.0 and fits twelve channels, beating US and Brazil (ten each).
    let selection = ChannelPlan::regulatory().resolve_by_range(902.0, 907.5).unwrap();

    assert_eq!(selection.band_id(), 12);
    assert_eq!(selection.min_index(), 0);
    assert_eq!(selection.max_index(), 11);
    assert_eq!(selection.channel_count(), 12);
}

#[test]
fn test_equal_coverage_resolves_to_lowest_band_id() {
    let plan = ChannelPlan::new([
        Band::new(24, "Australia", 920.25, 0.5, 0, 9).unwrap(),
        Band::new(16, "Hong Kong", 920.25, 0.5, 0, 9).unwrap(),
        Band::new(22, "Thailand", 920.25, 0.5, 0, 9).unwrap(),
    ])
    .unwrap();

    for _ in 0..10 {
        assert_eq!(plan.resolve_by_range(920.0, 925.0).unwrap().band_id(), 16);
    }
}

#[test]
fn test_fractional_steps_do_not_lose_boundary_channels() {
    let korean = ChannelPlan::new([Band::new(3, "Korean", 917.1, 0.2, 0, 31).unwrap()]).unwrap();
    let selection = korean.resolve_by_range(917.3, 917.7).unwrap();

    assert_eq!((selection.min_index(), selection.max_index()), (1, 3));
}

#[test]
fn test_upper_bound_clamped_to_band() {
    let selection = us_only().resolve_by_range(920.0, 1000.0).unwrap();
    assert_eq!(selection.max_index(), 49);
    assert_eq!(selection.min_index(), 35);
}

#[test]
fn test_resolution_stays_inside_band_bounds() {
    let plan = ChannelPlan::regulatory();
    let mut min = 830.0;
    while min < 935.0 {
        for width in [0.05, 0.4, 1.0, 3.7, 12.0] {
            let max = min + width;
            match plan.resolve_by_range(min, max) {
                Ok(selection) => {
                    let band = selection.band();
                    assert!(selection.min_index() <= selection.max_index());
                    assert!(selection.min_index() >= band.min_index());
                    assert!(selection.max_index() <= band.max_index());
                    assert!(selection.min_frequency() >= min - 1e-6);
                    assert!(selection.max_frequency() <= max + 1e-6);
                }
                Err(err) => {
                    assert_eq!(err, ChannelError::NoChannelOverlap { min_mhz: min, max_mhz: max });
                }
            }
        }
        min += 0.7;
    }
}

#[test]
fn test_index_resolution_reproduces_range_resolution() {
    let plan = ChannelPlan::regulatory();
    for (min, max) in [(902.0, 907.5), (865.0, 868.0), (917.0, 920.0), (920.0, 926.0), (840.0, 845.0)] {
        let by_range = plan.resolve_by_range(min, max).unwrap();
        let by_index = plan
            .resolve_by_index(by_range.band_id(), by_range.min_index(), by_range.max_index())
            .unwrap();

        assert_eq!(by_index, by_range);
        let lhs: Vec<f64> = by_range.frequencies().collect();
        let rhs: Vec<f64> = by_index.frequencies().collect();
        assert_eq!(lhs, rhs);
    }
}

#[test]
fn test_window_without_channels_is_rejected() {
    let err = ChannelPlan::regulatory().resolve_by_range(700.0, 710.0).unwrap_err();
    assert_eq!(err, ChannelError::NoChannelOverlap { min_mhz: 700.0, max_mhz: 710.0 });

    // Narrower than one step and between two US channels.
    assert!(matches!(
        us_only().resolve_by_range(903.0, 903.2),
        Err(ChannelError::NoChannelOverlap { .. })
    ));
}

#[test]
fn test_inverted_window_is_rejected() {
    let err = ChannelPlan::regulatory().resolve_by_range(910.0, 905.0).unwrap_err();
    assert_eq!(err, ChannelError::InvalidWindow { min_mhz: 910.0, max_mhz: 905.0 });
}

#[test]
fn test_non_finite_window_is_rejected() {
    let plan = ChannelPlan::regulatory();
    for (min, max) in [
        (f64::NAN, f64::NAN),
        (f64::NAN, 907.5),
        (902.0, f64::NAN),
        (f64::NEG_INFINITY, f64::INFINITY),
    ] {
        assert!(
            matches!(plan.resolve_by_range(min, max), Err(ChannelError::InvalidWindow { .. })),
            "window {}..{} should be rejected",
            min,
            max
        );
    }
}

#[test]
fn test_index_resolution_errors() {
    let plan = ChannelPlan::regulatory();

    assert_eq!(plan.resolve_by_index(5, 0, 1).unwrap_err(), ChannelError::UnknownBand(5));
    assert_eq!(
        plan.resolve_by_index(2, 0, 50).unwrap_err(),
        ChannelError::IndexOutOfRange { band: 2, min_index: 0, max_index: 50 }
    );
    assert_eq!(
        plan.resolve_by_index(2, 9, 3).unwrap_err(),
        ChannelError::InvalidRange { min_index: 9, max_index: 3 }
    );

    let single = plan.resolve_by_index(28, 0, 0).unwrap();
    assert_eq!(single.channel_count(), 1);
    assert!((single.min_frequency() - 916.25).abs() < TOLERANCE);
}

#[test]
fn test_custom_registry_validation() {
    assert!(matches!(
        Band::new(40, "Broken", 900.0, 0.0, 0, 3),
        Err(ChannelError::InvalidBand { id: 40, .. })
    ));
    assert!(matches!(
        Band::new(41, "Inverted", 900.0, 0.5, 5, 3),
        Err(ChannelError::InvalidBand { id: 41, .. })
    ));

    let dup = ChannelPlan::new([
        Band::new(7, "A", 900.0, 0.5, 0, 3).unwrap(),
        Band::new(7, "B", 910.0, 0.5, 0, 3).unwrap(),
    ]);
    assert_eq!(dup.unwrap_err(), ChannelError::DuplicateBand(7));
}

#[test]
fn test_frequency_spec_resolution() {
    let plan = ChannelPlan::regulatory();

    let indexed = plan
        .resolve(&FrequencySpec::Indexed { band: 4, min_index: 2, max_index: 6 })
        .unwrap();
    assert_eq!((indexed.band_id(), indexed.min_index(), indexed.max_index()), (4, 2, 6));

    let ranged = plan.resolve(&FrequencySpec::Range { min: 902.0, max: 907.5 }).unwrap();
    assert_eq!(ranged.band_id(), 12);
}
