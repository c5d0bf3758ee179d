use argh::FromArgs;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use rigreg::calib::{
    config::RegistrationConfig,
    inputs::resolve_inputs,
    picker::{PointPicker, PromptPicker},
    registration::{register_rig, PairRegistration},
    CalibrationError,
};
use rigreg::r3d::{pointcloud::PointCloud, transforms::RigidTransform};

#[derive(FromArgs)]
/// Register sub cameras onto the master camera from manually picked points.
///
/// Pass the master first: `-p master_1 -p sub_1 -p sub_2`.
struct Args {
    /// path to a device recording directory or a .pcd file, master first
    #[argh(option, short = 'p')]
    paths: Vec<PathBuf>,

    /// row of the synchronized frame table used for calibration
    #[argh(option, short = 'f', default = "1")]
    frame: usize,

    /// path to a JSON registration config
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// pick from the terminal only, without the viewer
    #[argh(switch)]
    headless: bool,
}

/// Shows the cloud in the viewer while the operator types indices in the terminal.
///
/// Point indices are the instance indices shown in the viewer selection panel.
struct ViewerPicker<R, W> {
    rec: rerun::RecordingStream,
    prompt: PromptPicker<R, W>,
}

impl<R: BufRead, W: Write> PointPicker for ViewerPicker<R, W> {
    fn pick_points(&mut self, cloud: &PointCloud, label: &str) -> Result<Vec<usize>, CalibrationError> {
        let entity = format!("picking/{label}");
        if let Err(e) = log_pointcloud(&self.rec, &entity, cloud, None) {
            log::warn!("cannot show {label}: {e}");
        }

        let picks = self.prompt.pick_points(cloud, label)?;

        let picked = picks
            .iter()
            .filter_map(|&i| cloud.point(i))
            .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
            .collect::<Vec<_>>();
        let markers = rerun::Points3D::new(picked)
            .with_radii([0.01f32])
            .with_colors([rerun::Color::from_rgb(255, 0, 0)]);
        if let Err(e) = self.rec.log(format!("{entity}/picks"), &markers) {
            log::warn!("cannot show picks on {label}: {e}");
        }

        Ok(picks)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => RegistrationConfig::from_file(path)?,
        None => RegistrationConfig::default(),
    };

    let inputs = resolve_inputs(&args.paths)?;
    let clouds = inputs.load_clouds(args.frame, &config)?;
    let (master, subs) = clouds.split_first().ok_or("no point cloud loaded")?;
    println!("Master cloud: #{} points", master.len());
    for (i, sub) in subs.iter().enumerate() {
        println!("Sub {} cloud: #{} points", i + 1, sub.len());
    }

    let prompt = PromptPicker::new(std::io::stdin().lock(), std::io::stdout());

    let results = if args.headless {
        let mut picker = prompt;
        register_rig(master, subs, &mut picker, &config)
    } else {
        // create a Rerun recording stream
        let rec = rerun::RecordingStreamBuilder::new("manual_registration").spawn()?;
        log_pointcloud(&rec, "master", master, None)?;
        for (i, sub) in subs.iter().enumerate() {
            log_pointcloud(&rec, &format!("sub_{}/initial", i + 1), sub, None)?;
        }

        let mut picker = ViewerPicker {
            rec: rec.clone(),
            prompt,
        };
        let results = register_rig(master, subs, &mut picker, &config);

        for pair in results.iter().flatten() {
            show_registration(&rec, subs, pair)?;
        }
        results
    };

    let store = inputs.transform_store();
    let mut num_failed = 0;
    for (i, result) in results.into_iter().enumerate() {
        match result {
            Ok(pair) => {
                println!(
                    "Sub {}: fitness {:.3}, rmse {:.5}{}",
                    pair.sub_index,
                    pair.icp.fitness,
                    pair.icp.rmse,
                    if pair.icp.converged { "" } else { " (not converged)" }
                );
                let path = store.save(pair.sub_index, &pair.transform())?;
                println!("Your transformation is saved under: {}", path.display());
            }
            Err(e) => {
                eprintln!("Sub {} was not registered: {e}", i + 1);
                num_failed += 1;
            }
        }
    }

    if num_failed > 0 {
        return Err(format!("{num_failed} of {} sub devices failed to register", subs.len()).into());
    }

    Ok(())
}

fn show_registration(
    rec: &rerun::RecordingStream,
    subs: &[PointCloud],
    pair: &PairRegistration,
) -> Result<(), Box<dyn std::error::Error>> {
    let sub = &subs[pair.sub_index - 1];
    log_pointcloud(
        rec,
        &format!("sub_{}/coarse", pair.sub_index),
        sub,
        Some(&pair.coarse),
    )?;
    log_pointcloud(
        rec,
        &format!("sub_{}/registered", pair.sub_index),
        sub,
        Some(&pair.transform()),
    )?;
    Ok(())
}

fn log_pointcloud(
    rec: &rerun::RecordingStream,
    name: &str,
    pointcloud: &PointCloud,
    master_from_cloud: Option<&RigidTransform>,
) -> Result<(), rerun::RecordingStreamError> {
    let points = pointcloud
        .points()
        .iter()
        .map(|p| match master_from_cloud {
            Some(t) => t.apply(p),
            None => *p,
        })
        .map(|p| rerun::Position3D::new(p[0] as f32, p[1] as f32, p[2] as f32))
        .collect::<Vec<_>>();

    let colors = match pointcloud.colors() {
        Some(colors) => colors
            .iter()
            .map(|c| rerun::Color::from_rgb(c[0], c[1], c[2]))
            .collect(),
        None => vec![rerun::Color::from_rgb(90, 145, 199); points.len()],
    };

    rec.log(name, &rerun::Points3D::new(points).with_colors(colors))
}
