use noteflow::{init_logging, install_event_bus, load_settings, StartupReport, BUILD_DATE, VERSION};
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let arg = std::env::args().nth(1);
    if matches!(arg.as_deref(), Some("--version" | "-V")) {
        println!("noteflow {} (built {})", VERSION, BUILD_DATE);
        return Ok(());
    }

    // Initialize logging
    init_logging()?;

    let config_path = arg.map(PathBuf::from);
    let settings = load_settings(config_path.as_deref())?;
    let bus = install_event_bus(&settings)?;
    bus.ready();

    let report = StartupReport::capture(&bus);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
