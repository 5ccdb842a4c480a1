use chrono::{Datelike, Duration, Local, NaiveDate, Weekday};
use clap::Parser;
use sus_agenda::adapters::csv_store::render_csv;
use sus_agenda::domain::model::{Availability, Schedule, Slot, SLOT_DATE_FORMAT};
use sus_agenda::utils::logger;

#[derive(Parser)]
#[command(name = "seed-schedule")]
#[command(about = "Writes a sample schedule CSV with open slots")]
struct Args {
    /// Output CSV path
    #[arg(short, long, default_value = "agenda_clinicas.csv")]
    output: String,

    /// Comma-separated clinic names
    #[arg(long, default_value = "UBS Centro,UBS Fragata")]
    clinics: String,

    /// Comma-separated exam names
    #[arg(long, default_value = "Raio-X,Ultrassom,Mamografia,Eletrocardiograma")]
    exams: String,

    /// Number of working days to generate, starting tomorrow
    #[arg(short, long, default_value_t = 10)]
    days: u32,

    /// First day in YYYY-MM-DD (defaults to tomorrow)
    #[arg(long)]
    start: Option<String>,

    /// Comma-separated slot times
    #[arg(long, default_value = "08:00,09:00,10:00,14:00,15:00")]
    times: String,

    #[arg(short, long)]
    verbose: bool,
}

fn list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn working_days(start: NaiveDate, count: u32) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut day = start;
    while days.len() < count as usize {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            days.push(day);
        }
        day += Duration::days(1);
    }
    days
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logger::init_logger(args.verbose, false);

    let start = match &args.start {
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                eprintln!("❌ Invalid start date '{}': {}", raw, e);
                eprintln!("💡 Use the YYYY-MM-DD format");
                std::process::exit(1);
            }
        },
        None => Local::now().date_naive() + Duration::days(1),
    };

    let clinics = list(&args.clinics);
    let exams = list(&args.exams);
    let times = list(&args.times);
    let days = working_days(start, args.days);

    let mut slots = Vec::new();
    for day in &days {
        for clinic in &clinics {
            for exam in &exams {
                for time in &times {
                    slots.push(Slot {
                        clinic: clinic.clone(),
                        exam: exam.clone(),
                        date: day.format(SLOT_DATE_FORMAT).to_string(),
                        time: time.clone(),
                        available: Availability::Open,
                        ..Slot::default()
                    });
                }
            }
        }
    }

    let schedule = Schedule::new(slots);
    tracing::info!(
        "Generated {} slots across {} days for {} exams",
        schedule.len(),
        days.len(),
        exams.len()
    );

    let bytes = match render_csv(&schedule.to_grid()) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };
    std::fs::write(&args.output, bytes)?;

    println!("✅ {} slots written to {}", schedule.len(), args.output);
    Ok(())
}
