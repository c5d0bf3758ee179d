use argh::FromArgs;
use std::path::PathBuf;

use rigreg::calib::{
    batch::register_session,
    config::RegistrationConfig,
    inputs::{resolve_inputs, RegistrationInputs},
};

#[derive(FromArgs)]
/// Move every synchronized frame of a session into the master camera frame.
///
/// Run `manual_registration` on the same devices first.
struct Args {
    /// path to a device recording directory, master first
    #[argh(option, short = 'p')]
    paths: Vec<PathBuf>,

    /// path to a JSON registration config
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => RegistrationConfig::from_file(path)?,
        None => RegistrationConfig::default(),
    };

    let inputs = resolve_inputs(&args.paths)?;
    let RegistrationInputs::Devices(devices) = &inputs else {
        return Err("register_sequence needs device recording directories".into());
    };

    let store = inputs.transform_store();
    log::info!("using transforms from {}", store.master_dir().display());

    let report = register_session(devices, &store, &config)?;
    println!(
        "Registered {} frames ({} skipped), merged clouds in {}",
        report.frames_written,
        report.frames_skipped,
        devices[0].merged_dir().display()
    );

    Ok(())
}
