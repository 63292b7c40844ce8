use std::path::PathBuf;
use std::thread;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Result};
use tracing::info;

use tabu_core::laundry::CycleType;
use tabu_core::platform::RuntimeSignals;
use tabu_core::preferences::{EventKind, Facility, ALL_FACILITIES};
use tabu_core::TabuService;

/// Headless shell around the notification core. The production UI lives in
/// the web layer; this binary exists for development runs, where the console
/// bridge stands in for the platform notification plugin.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub signals: RuntimeSignals,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            signals: RuntimeSignals::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var("TABU_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(agent) = std::env::var("TABU_USER_AGENT") {
            config.signals.user_agent = agent;
        }
        config.signals.has_native_bridge = env_flag("TABU_NATIVE_BRIDGE");
        config.signals.standalone_display = env_flag("TABU_STANDALONE");
        Ok(config)
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

pub fn run(config: AppConfig) -> Result<()> {
    let service = TabuService::builder()
        .with_signals(config.signals.clone())
        .with_data_dir(&config.data_dir)
        .on_laundry_collected(Box::new(|timer_id| {
            info!(timer = %timer_id, "laundry collected");
        }))
        .build()?;
    service.initialize_notifications();
    info!(platform = ?service.platform(), "TABU notification core ready");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("start") => start_cycle(&service, &args[1..]),
        Some("test") => send_test(&service, &args[1..]),
        Some("prefs") => show_or_set_prefs(&service, &args[1..]),
        Some(other) => Err(anyhow!("unknown command `{other}`")),
        None => {
            print_status(&service);
            Ok(())
        }
    }
}

fn start_cycle(service: &TabuService, args: &[String]) -> Result<()> {
    let machine: u32 = args
        .first()
        .ok_or_else(|| anyhow!("usage: tabu start <machine> <wash|dry> <minutes>"))?
        .parse()?;
    let cycle: CycleType = args
        .get(1)
        .ok_or_else(|| anyhow!("missing cycle type"))?
        .parse()
        .map_err(|err: String| anyhow!(err))?;
    let minutes: u32 = args
        .get(2)
        .ok_or_else(|| anyhow!("missing duration"))?
        .parse()?;

    let timer_id = service.start_laundry_cycle(machine, cycle, minutes);
    info!(timer = %timer_id, "cycle started");

    // The deferred channels only fire while something pumps them, the same
    // way the browser fallback needs its page to stay open.
    while !service.active_timers().is_empty() {
        service.tick();
        println!(
            "machine {machine}: {} remaining",
            service.formatted_remaining(&timer_id)
        );
        thread::sleep(StdDuration::from_secs(15));
    }
    service.tick();
    println!("machine {machine}: cycle finished");
    Ok(())
}

fn send_test(service: &TabuService, args: &[String]) -> Result<()> {
    let facility: Facility = args
        .first()
        .ok_or_else(|| anyhow!("usage: tabu test <facility> <opening|event>"))?
        .parse()
        .map_err(|err: String| anyhow!(err))?;
    let kind = match args.get(1).map(String::as_str) {
        Some("event") => EventKind::Event,
        _ => EventKind::Opening,
    };

    if !service.send_test_notification(facility, facility.as_str(), kind) {
        println!("notifications for {facility} are disabled; enable them with `tabu prefs`");
        return Ok(());
    }
    // Give the two-second test delivery a chance to come due.
    for _ in 0..4 {
        thread::sleep(StdDuration::from_secs(1));
        if !service.tick().is_empty() {
            break;
        }
    }
    Ok(())
}

fn show_or_set_prefs(service: &TabuService, args: &[String]) -> Result<()> {
    if let (Some(facility), Some(kind), Some(value)) = (args.first(), args.get(1), args.get(2)) {
        let facility: Facility = facility.parse().map_err(|err: String| anyhow!(err))?;
        let kind = match kind.as_str() {
            "opening" => EventKind::Opening,
            "events" | "event" => EventKind::Event,
            other => return Err(anyhow!("unknown notification type `{other}`")),
        };
        let enabled = matches!(value.as_str(), "on" | "true" | "1");
        service.set_preference(facility, kind, enabled)?;
    }

    let prefs = service.preferences();
    for facility in ALL_FACILITIES {
        let entry = prefs.facility(facility);
        println!(
            "{:<10} opening={} events={}",
            facility.as_str(),
            entry.opening,
            entry.events
        );
    }
    Ok(())
}

fn print_status(service: &TabuService) {
    let timers = service.active_timers();
    if timers.is_empty() {
        println!("no laundry cycles in progress");
        return;
    }
    for timer in timers {
        println!(
            "machine {} ({}) finishes at {}",
            timer.machine_number,
            timer.cycle_type,
            timer.end_time.format("%H:%M")
        );
    }
}
