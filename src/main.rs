use anyhow::{bail, Context, Result};
use clap::Parser;
use log::debug;
use sleep_study::config::{Args, Settings, ViewMode};
use sleep_study::data_loading::discover_reports;
use sleep_study::output;
use sleep_study::position::{PositionBreakdown, PositionCategory};
use sleep_study::report::{FieldStatus, MetricField};
use sleep_study::session::{load_sessions, specs_for_reports, Session};

fn print_metrics_table(sessions: &[Session]) {
    print!("\n{:<18}", "Metric");
    for session in sessions {
        print!("{:>14}", session.label);
    }
    println!();
    println!("{}", "-".repeat(18 + 14 * sessions.len()));

    for field in MetricField::ALL {
        print!("{:<18}", field.key());
        for session in sessions {
            let value = session.metrics().get(field);
            let marker = match session.extraction.status(field) {
                FieldStatus::Matched => " ",
                FieldStatus::Defaulted => "*",
            };
            print!("{:>13.1}{}", value, marker);
        }
        println!();
    }

    let derived = [
        ("desat_events", sessions.iter().map(|s| s.metrics().desat_events).collect::<Vec<_>>()),
        ("awakenings", sessions.iter().map(|s| s.metrics().awakenings).collect()),
    ];
    for (name, values) in derived {
        print!("{:<18}", name);
        for value in values {
            print!("{:>13} ", value);
        }
        println!();
    }
    println!("(* = not found in report, default used)");
}

fn print_positions(positions: &[PositionCategory]) {
    let breakdown = PositionBreakdown::from_positions(positions);
    if breakdown.total() == 0 {
        println!("  No position samples");
        return;
    }
    print!("  Position:");
    for category in PositionCategory::ALL {
        print!(" {} {:.1}%", category, breakdown.percent(category));
    }
    println!();
}

fn print_view_summary(time: &[f64], channels: &[(&str, &[f64])]) {
    println!("  {} samples, {} channel(s)", time.len(), channels.len());
    for (key, values) in channels {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            println!("    {:<18} --", key);
            continue;
        }
        let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = finite.iter().sum::<f64>() / finite.len() as f64;
        println!(
            "    {:<18} min {:>10.3}  mean {:>10.3}  max {:>10.3}",
            key, min, mean, max
        );
    }
}

fn show_window(args: &Args, session: &Session) -> Result<()> {
    let Some(accessor) = &session.signals else {
        bail!(
            "Session '{}' has no full-resolution signals (use --signals)",
            session.label
        );
    };

    let view = accessor.get_window(args.window);
    println!(
        "\n{} - {} - {} data points",
        session.label,
        accessor.window_label(args.window),
        view.len()
    );
    if view.is_empty() {
        println!("  No data in this window");
        return Ok(());
    }

    let channels: Vec<(&str, &[f64])> = view.channels().collect();
    print_view_summary(view.time(), &channels);
    let positions = accessor.positions(&view);
    if let Some(positions) = &positions {
        print_positions(positions);
    }

    if let Some(base_path) = &args.csv_output {
        output::write_window_csv(
            base_path,
            &session.label,
            args.window,
            &view,
            positions.as_deref(),
        )?;
    }
    Ok(())
}

fn show_full_night(args: &Args, session: &Session, settings: &Settings) -> Result<()> {
    let Some(span) = session.full_night_span(args.stride) else {
        bail!(
            "Session '{}' has no signals for a full night view (use --signals or --signals-fullnight)",
            session.label
        );
    };

    let duration_h = span.time_hours.last().copied().unwrap_or(0.0);
    println!(
        "\n{} - full night ({:.2} h, {} points, stride {})",
        session.label,
        duration_h,
        span.len(),
        span.stride
    );

    let channels: Vec<(&str, &[f64])> = span
        .channels
        .iter()
        .map(|c| (c.key.as_str(), c.values.as_slice()))
        .collect();
    print_view_summary(&span.time_hours, &channels);
    let positions = settings
        .signals
        .position_channel
        .as_deref()
        .and_then(|key| span.positions(key));
    if let Some(positions) = &positions {
        print_positions(positions);
    }

    if let Some(base_path) = &args.csv_output {
        output::write_full_span_csv(base_path, &session.label, &span, positions.as_deref())?;
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?;

    let reports = if args.input_path.is_dir() {
        discover_reports(&args.input_path, &settings.report_suffix)?
    } else {
        vec![args.input_path.clone()]
    };
    if reports.is_empty() {
        bail!(
            "No files ending in '{}' found in {}",
            settings.report_suffix,
            args.input_path.display()
        );
    }
    println!("Found {} report(s):", reports.len());
    for report in &reports {
        println!("  {}", report.display());
    }

    let mut specs = specs_for_reports(reports, &args.labels);
    if args.signals.is_some() || args.signals_fullnight.is_some() {
        let count = specs.len();
        let spec = specs.get_mut(args.signal_session).with_context(|| {
            format!(
                "--signal-session {} is out of range ({} session(s))",
                args.signal_session, count
            )
        })?;
        spec.signals = args.signals.clone();
        spec.full_night = args.signals_fullnight.clone();
    }
    debug!("Session specs: {:?}", specs);

    let sessions = load_sessions(&specs, &settings)?;

    if args.json {
        println!("{}", output::metrics_json(&sessions)?);
    } else {
        print_metrics_table(&sessions);
    }

    if let Some(base_path) = &args.csv_output {
        output::write_metrics_csv(base_path, &sessions)?;
    }

    if let Some(session) = sessions.get(args.signal_session) {
        let has_signals = session.signals.is_some() || session.full_night.is_some();
        if has_signals {
            match args.view {
                ViewMode::Windowed => show_window(&args, session)?,
                ViewMode::FullNight => show_full_night(&args, session, &settings)?,
            }
        }
    }

    Ok(())
}
