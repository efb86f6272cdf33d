use anyhow::Result;
use sleep_study::config::Settings;
use sleep_study::data_loading::read_report;
use sleep_study::report::FieldStatus;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        println!("Usage: {} <report_file>", args[0]);
        std::process::exit(1);
    }

    let config = std::env::var_os("SLEEP_STUDY_CONFIG").map(PathBuf::from);
    let settings = Settings::load(config.as_deref())?;
    let extractor = settings.extractor()?;
    let extraction = read_report(Path::new(&args[1]), &extractor);

    println!("\nFields:");
    for outcome in &extraction.fields {
        let status = match outcome.status {
            FieldStatus::Matched => "matched",
            FieldStatus::Defaulted => "DEFAULT",
        };
        println!(
            "  {:<18} {:>8.2}  {}",
            outcome.field.key(),
            outcome.value,
            status
        );
    }

    let m = &extraction.metrics;
    println!("\nDerived:");
    println!("  {:<18} {:>8}", "desat_events", m.desat_events);
    println!("  {:<18} {:>8}", "awakenings", m.awakenings);

    if extraction.all_matched() {
        println!("\nAll fields found");
    } else {
        println!(
            "\n{} of {} fields defaulted",
            extraction.defaulted_fields().len(),
            extraction.fields.len()
        );
    }

    Ok(())
}
