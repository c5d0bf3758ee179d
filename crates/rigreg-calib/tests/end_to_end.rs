use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, Rng, SeedableRng};
use rigreg_3d::{
    camera::PinholeCameraIntrinsic,
    io::pcd::{read_pcd, write_pcd_binary},
    pointcloud::PointCloud,
    transforms::RigidTransform,
};
use rigreg_calib::{
    batch::register_session,
    config::RegistrationConfig,
    device::{Device, COLOR_DIR, DEPTH_DIR},
    inputs::{resolve_inputs, RegistrationInputs},
    picker::ScriptedPicker,
    registration::register_rig,
    CalibrationError,
};
use rigreg_io::{depth::write_depth_raw, png::write_image_png_rgb8, ImageSize};

const WIDTH: usize = 8;
const HEIGHT: usize = 6;

fn write_frame(device: &Device, timestamp: u64, depth: &[u16]) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(device.root().join(COLOR_DIR))?;
    std::fs::create_dir_all(device.root().join(DEPTH_DIR))?;
    let rgb = (0..WIDTH * HEIGHT)
        .map(|i| [i as u8, 100, 200])
        .collect::<Vec<_>>();
    let size = ImageSize {
        width: WIDTH,
        height: HEIGHT,
    };
    write_image_png_rgb8(device.color_path(timestamp), &rgb, size)?;
    write_depth_raw(device.depth_path(timestamp), depth)?;
    Ok(())
}

fn depth_map() -> Vec<u16> {
    (0..HEIGHT)
        .flat_map(|v| (0..WIDTH).map(move |u| 1000 + 50 * (u + v) as u16))
        .collect()
}

fn random_cloud(num_points: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(1234);
    let points = (0..num_points)
        .map(|_| [rng.random::<f64>(), rng.random::<f64>(), 1.0 + rng.random::<f64>()])
        .collect();
    PointCloud::new(points, None, None)
}

fn setup_session(root: &Path) -> Result<Vec<Device>, Box<dyn std::error::Error>> {
    let master = Device::master(root.join("master_1"));
    let sub = Device::sub(1, root.join("sub_1"));
    let intrinsics = PinholeCameraIntrinsic::new((10.0, 10.0), (4.0, 3.0), (WIDTH, HEIGHT));

    for device in [&master, &sub] {
        device.save_intrinsics(&intrinsics)?;
    }

    let depth = depth_map();
    for ts in [1_000, 34_333, 67_666, 100_000, 133_333] {
        write_frame(&master, ts, &depth)?;
    }
    // the sub triggers 100 us later and misses the frame at 100 ms
    for ts in [1_100, 34_433, 67_766] {
        write_frame(&sub, ts, &depth)?;
    }
    // a truncated depth frame
    write_frame(&sub, 133_433, &depth[..10])?;

    Ok(vec![master, sub])
}

#[test]
fn test_manual_registration_from_pcd_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let source = random_cloud(500);
    let master_from_sub =
        RigidTransform::from_axis_angle(&[0.0, 0.0, 1.0], 30f64.to_radians(), [0.1, 0.0, 0.0])?;

    let sub_picks = vec![0, 10, 20, 30, 40];
    let master_picks = sub_picks.iter().map(|i| 499 - i).collect::<Vec<_>>();

    // the master cloud stores the moved points in reverse order, and the
    // picked points are off by a few millimeters as with a manual pick
    let mut moved = source.transformed(&master_from_sub).points().clone();
    moved.reverse();
    let mut rng = StdRng::seed_from_u64(42);
    for &i in &master_picks {
        for k in 0..3 {
            moved[i][k] += 0.01 * (rng.random::<f64>() - 0.5);
        }
    }
    let target = PointCloud::new(moved, None, None);

    let master_path = dir.path().join("master_1.pcd");
    let sub_path = dir.path().join("sub_1.pcd");
    write_pcd_binary(&master_path, &target)?;
    write_pcd_binary(&sub_path, &source)?;

    let inputs = resolve_inputs(&[master_path, sub_path])?;
    assert!(matches!(inputs, RegistrationInputs::PointClouds(_)));

    let config = RegistrationConfig::default();
    let clouds = inputs.load_clouds(1, &config)?;

    let mut picker = ScriptedPicker::new([sub_picks, master_picks]);

    let results = register_rig(&clouds[0], &clouds[1..], &mut picker, &config);
    assert_eq!(results.len(), 1);

    let store = inputs.transform_store();
    let mut saved = Vec::new();
    for result in results {
        let pair = result?;
        assert!(pair.icp.converged);

        // the refinement improves on the coarse alignment from the picks
        let (coarse_angle, coarse_distance) = pair.coarse.difference(&master_from_sub);
        let (angle, distance) = pair.transform().difference(&master_from_sub);
        assert!(
            angle + distance < coarse_angle + coarse_distance,
            "coarse ({coarse_angle}, {coarse_distance}) refined ({angle}, {distance})"
        );

        saved.push(store.save(pair.sub_index, &pair.transform())?);
    }
    assert_eq!(saved, vec![dir.path().join("transformation_master_sub_1.npy")]);

    let loaded = store.load(1)?;
    let (angle, distance) = loaded.difference(&master_from_sub);
    assert!(angle < 0.01, "rotation error {angle} rad");
    assert!(distance < 1e-3, "translation error {distance} m");
    Ok(())
}

#[test]
fn test_calibrate_and_register_session() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let devices = setup_session(dir.path())?;
    let paths = devices
        .iter()
        .map(|d| d.root().to_path_buf())
        .collect::<Vec<PathBuf>>();

    let config = RegistrationConfig::default();
    let inputs = resolve_inputs(&paths)?;
    assert_eq!(inputs, RegistrationInputs::Devices(devices.clone()));

    // both devices see the same frame, so picks on the same pixels align them
    let clouds = inputs.load_clouds(1, &config)?;
    assert_eq!(clouds[0].len(), WIDTH * HEIGHT);
    assert_eq!(clouds[0], clouds[1]);

    let mut picker = ScriptedPicker::new([vec![0, 7, 40, 47], vec![0, 7, 40, 47]]);
    let results = register_rig(&clouds[0], &clouds[1..], &mut picker, &config);
    let pair = results.into_iter().next().ok_or("no result")??;
    assert!(pair.transform().rotation_angle() < 1e-6);
    assert!(pair.transform().translation_norm() < 1e-6);

    // store a known transform and apply it to the whole sequence
    let store = inputs.transform_store();
    let master_from_sub = RigidTransform::from_axis_angle(&[0.0, 1.0, 0.0], 0.1, [0.2, 0.0, -0.1])?;
    store.save(1, &master_from_sub)?;

    let report = register_session(&devices, &store, &config)?;
    assert_eq!(report.frames_written, 3);
    assert_eq!(report.frames_skipped, 1);
    assert_eq!(
        report.merged_paths,
        (0..3)
            .map(|i| devices[0].merged_dir().join(format!("{i}.pcd")))
            .collect::<Vec<_>>()
    );

    let registered = read_pcd(devices[1].registered_dir().join("34433.pcd"))?;
    let expected = clouds[1].transformed(&master_from_sub);
    assert_eq!(registered.len(), expected.len());
    for (p, q) in registered.points().iter().zip(expected.points()) {
        for k in 0..3 {
            assert!((p[k] - q[k]).abs() < 1e-5);
        }
    }
    assert_eq!(registered.colors(), expected.colors());

    let merged = read_pcd(&report.merged_paths[0])?;
    assert_eq!(merged.len(), 2 * WIDTH * HEIGHT);
    Ok(())
}

#[test]
fn test_register_session_skips_corrupt_color() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let devices = setup_session(dir.path())?;
    std::fs::write(devices[1].color_path(34_433), b"\x89PNG garbage")?;

    let store = rigreg_calib::persistence::TransformStore::new(devices[0].root());
    store.save(1, &RigidTransform::identity())?;

    let report = register_session(&devices, &store, &RegistrationConfig::default())?;
    assert_eq!(report.frames_written, 2);
    assert_eq!(report.frames_skipped, 2);
    assert!(!devices[1].registered_dir().join("34433.pcd").exists());
    assert!(devices[1].registered_dir().join("67766.pcd").exists());
    Ok(())
}

#[test]
fn test_register_session_without_transforms() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let devices = setup_session(dir.path())?;
    let store = rigreg_calib::persistence::TransformStore::new(devices[0].root());

    let res = register_session(&devices, &store, &RegistrationConfig::default());
    assert!(matches!(res, Err(CalibrationError::Io(_))));
    Ok(())
}

#[test]
fn test_frame_out_of_range() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let devices = setup_session(dir.path())?;
    let paths = devices
        .iter()
        .map(|d| d.root().to_path_buf())
        .collect::<Vec<_>>();

    let inputs = resolve_inputs(&paths)?;
    let res = inputs.load_clouds(10, &RegistrationConfig::default());
    assert!(matches!(
        res,
        Err(CalibrationError::FrameOutOfRange { index: 10, len: 4 })
    ));
    Ok(())
}
