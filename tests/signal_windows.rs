use proptest::prelude::*;
use sleep_study::config::SignalConfig;
use sleep_study::data_loading::read_signal_csv;
use sleep_study::position::{classify_position, PositionCategory};
use sleep_study::window::SignalAccessor;
use sleep_study::{Channel, SignalTable};
use std::io::Write;

const HEADER: &str =
    "time,NasalFlow_cmH2O,SpO2_pct,Activity_gps,PosAngle_deg,AudioVolume_dB,cRIP_Flow";

/// `rows` samples at 10 Hz; the position angle changes band every 100 rows.
fn write_signals(rows: usize) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for i in 0..rows {
        let angle = match (i / 100) % 4 {
            0 => 0.0,
            1 => 90.0,
            2 => -90.0,
            _ => 180.0,
        };
        writeln!(
            file,
            "{:.1},{},{},0.0004,{},41.5,{}",
            i as f64 / 10.0,
            0.5,
            94.0 + (i % 5) as f64,
            angle,
            i
        )
        .unwrap();
    }
    file.flush().unwrap();
    file
}

fn synthetic(rows: usize, window: usize) -> SignalAccessor {
    let table = SignalTable::new(
        (0..rows).map(|i| i as f64).collect(),
        vec![Channel {
            key: "row".to_string(),
            values: (0..rows).map(|i| i as f64).collect(),
        }],
    )
    .unwrap();
    let config = SignalConfig {
        samples_per_window: window,
        position_channel: None,
        ..SignalConfig::default()
    };
    SignalAccessor::new(table, &config).unwrap()
}

#[test]
fn ninety_seconds_at_ten_hz() {
    let file = write_signals(900);
    let config = SignalConfig::default();
    let table = read_signal_csv(file.path(), &config).unwrap();
    let accessor = SignalAccessor::new(table, &config).unwrap();

    assert_eq!(accessor.window_count(), 3);

    let first = accessor.get_window(0);
    assert_eq!(first.len(), 300);
    assert_eq!(first.channel("cRIP_Flow").unwrap()[0], 0.0);
    assert_eq!(first.channel("cRIP_Flow").unwrap()[299], 299.0);

    let last = accessor.get_window(2);
    assert_eq!(last.len(), 300);
    assert_eq!(last.channel("cRIP_Flow").unwrap()[0], 600.0);
    assert_eq!(last.channel("cRIP_Flow").unwrap()[299], 899.0);
    assert_eq!(last.time()[0], 60.0);

    assert!(accessor.get_window(3).is_empty());
    assert_eq!(accessor.window_label(2).to_string(), "Window 3 (60-90s) of 3");
}

#[test]
fn window_positions_follow_angle_bands() {
    let file = write_signals(900);
    let config = SignalConfig::default();
    let table = read_signal_csv(file.path(), &config).unwrap();
    let accessor = SignalAccessor::new(table, &config).unwrap();

    let positions = accessor.positions(&accessor.get_window(0)).unwrap();
    assert_eq!(positions[0], PositionCategory::Supine);
    assert_eq!(positions[100], PositionCategory::Right);
    assert_eq!(positions[200], PositionCategory::Left);

    let positions = accessor.positions(&accessor.get_window(1)).unwrap();
    assert_eq!(positions[0], PositionCategory::Prone);
}

#[test]
fn full_span_is_plain_thinning() {
    let file = write_signals(900);
    let config = SignalConfig::default();
    let table = read_signal_csv(file.path(), &config).unwrap();
    let accessor = SignalAccessor::new(table, &config).unwrap();

    let span = accessor.full_span(7);
    let rows: Vec<f64> = span.channel("cRIP_Flow").unwrap().to_vec();
    let expected: Vec<f64> = (0..900).step_by(7).map(|i| i as f64).collect();
    assert_eq!(rows, expected);
    assert_eq!(span.time_hours[1], 0.7 / 3600.0);
}

#[test]
fn position_edges() {
    assert_eq!(classify_position(45.0), PositionCategory::Supine);
    assert_eq!(classify_position(45.0001), PositionCategory::Right);
    assert_eq!(classify_position(-45.0), PositionCategory::Supine);
    assert_eq!(classify_position(-45.0001), PositionCategory::Left);
    assert_eq!(classify_position(180.0), PositionCategory::Prone);
}

#[test]
fn header_only_file_is_empty_not_an_error() {
    let file = write_signals(0);
    let config = SignalConfig::default();
    let table = read_signal_csv(file.path(), &config).unwrap();
    let accessor = SignalAccessor::new(table, &config).unwrap();

    assert_eq!(accessor.window_count(), 0);
    assert!(accessor.get_window(0).is_empty());
    assert!(accessor.full_span(10).is_empty());
    assert_eq!(accessor.positions(&accessor.get_window(0)), Some(Vec::new()));
}

proptest! {
    #[test]
    fn partial_window_excluded_from_count(
        window in 1usize..400,
        k in 0usize..12,
        r_frac in 0.0f64..1.0,
    ) {
        let r = ((window as f64) * r_frac) as usize % window;
        let accessor = synthetic(k * window + r, window);

        prop_assert_eq!(accessor.window_count(), k);

        let tail = accessor.get_window(k);
        prop_assert_eq!(tail.len(), r);
        if r > 0 {
            prop_assert_eq!(tail.channel("row").unwrap()[0], (k * window) as f64);
        }
        prop_assert!(accessor.get_window(k + 1).is_empty());
    }

    #[test]
    fn side_bands_mirror_each_other(angle in 45.0001f64..135.0) {
        prop_assert_eq!(classify_position(angle), PositionCategory::Right);
        prop_assert_eq!(classify_position(-angle), PositionCategory::Left);
        prop_assert_eq!(classify_position(angle - 90.0), PositionCategory::Supine);
    }

    #[test]
    fn beyond_side_bands_is_prone(angle in 135.0001f64..720.0) {
        prop_assert_eq!(classify_position(angle), PositionCategory::Prone);
        prop_assert_eq!(classify_position(-angle), PositionCategory::Prone);
    }
}
