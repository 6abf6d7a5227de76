use std::{fs, path::Path};

use assert_cmd::Command;
use tempfile::TempDir;

#[allow(deprecated)]
fn trackport(workdir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("trackport").unwrap();
    cmd.current_dir(workdir).arg("--logs").arg(workdir.join("logs").join("test.log"));
    cmd
}

fn write_frames(frames_root: &Path, sequence: &str, count: usize) {
    let directory = frames_root.join(sequence);
    fs::create_dir_all(&directory).unwrap();
    for index in 1..=count {
        fs::write(directory.join(format!("{:06}.jpg", index)), b"frame").unwrap();
    }
}

const COCO: &str = r#"{
    "images": [
        {"id": 1, "file_name": "a/000001.jpg", "video": "uploads/1a2b3c4d-match.mp4", "frame_index": 0},
        {"id": 2, "file_name": "a/000031.jpg", "video": "uploads/1a2b3c4d-match.mp4", "frame_index": 30},
        {"id": 3, "file_name": "b/000001.jpg", "video": "uploads/warmup.mp4", "frame_index": 0}
    ],
    "annotations": [
        {"id": 10, "image_id": 1, "category_id": 1, "bbox": [100, 200, 50, 80], "track_id": 9},
        {"id": 11, "image_id": 2, "category_id": 1, "bbox": [110, 205, 50, 80], "track_id": 9},
        {"id": 12, "image_id": 3, "category_id": 1, "bbox": [10, 20, 30, 40], "track_id": 4}
    ],
    "categories": [{"id": 1, "name": "player"}]
}"#;

fn convert(workdir: &Path) -> assert_cmd::assert::Assert {
    fs::write(workdir.join("export.json"), COCO).unwrap();
    trackport(workdir)
        .args(["convert", "export.json", "--frames", "frames", "--output", "mot"])
        .args(["--source-fps", "30", "--sampling-rate", "1", "--width", "1920", "--height", "1080"])
        .assert()
}

#[test]
fn converts_and_checks_sequences() {
    let temp = TempDir::new().unwrap();
    write_frames(&temp.path().join("frames"), "match", 2);
    write_frames(&temp.path().join("frames"), "warmup", 1);

    convert(temp.path()).success();

    let sequence = temp.path().join("mot").join("match");
    let gt = fs::read_to_string(sequence.join("gt").join("gt.txt")).unwrap();
    assert_eq!(
        gt,
        "1,1,100.00,200.00,50.00,80.00,1,-1,-1,-1\n2,1,110.00,205.00,50.00,80.00,1,-1,-1,-1\n"
    );
    let seqinfo = fs::read_to_string(sequence.join("seqinfo.ini")).unwrap();
    assert!(seqinfo.contains("seqLength=2\n"));
    assert!(seqinfo.contains("frameRate=1\n"));
    assert!(temp.path().join("mot").join("report.json").exists());

    trackport(temp.path()).args(["check", "mot"]).assert().success();
}

#[test]
fn missing_frames_fail_the_run_but_not_other_videos() {
    let temp = TempDir::new().unwrap();
    write_frames(&temp.path().join("frames"), "match", 2);

    convert(temp.path()).failure();

    assert!(temp.path().join("mot").join("match").join("gt").join("gt.txt").exists());
    assert!(!temp.path().join("mot").join("warmup").exists());
    let report = fs::read_to_string(temp.path().join("mot").join("report.json")).unwrap();
    assert!(report.contains("\"failed\""));
}

#[test]
fn configuration_supplies_defaults() {
    let temp = TempDir::new().unwrap();
    write_frames(&temp.path().join("frames"), "match", 2);
    write_frames(&temp.path().join("frames"), "warmup", 1);
    fs::write(temp.path().join("export.json"), COCO).unwrap();

    trackport(temp.path())
        .args(["init", "--frames", "frames", "--output", "mot", "--source-fps", "30"])
        .args(["--frame-stride", "30", "--width", "1920", "--height", "1080"])
        .assert()
        .success();
    assert!(temp.path().join("trackport.json").exists());
    trackport(temp.path()).arg("init").assert().failure();

    trackport(temp.path())
        .args(["convert", "export.json", "--schema", "mot17"])
        .assert()
        .success();
    let gt = fs::read_to_string(temp.path().join("mot").join("match").join("gt").join("gt.txt"))
        .unwrap();
    assert!(gt.starts_with("1,1,100.00,200.00,50.00,80.00,1,1,1\n"));
}

#[test]
fn splits_exports_per_video() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("export.json"), COCO).unwrap();

    trackport(temp.path())
        .args(["split", "export.json", "--output", "split"])
        .assert()
        .success();

    let split = temp.path().join("split");
    let text = fs::read_to_string(split.join("match_coco.json")).unwrap();
    let document: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(document["images"].as_array().unwrap().len(), 2);
    assert_eq!(document["annotations"].as_array().unwrap().len(), 2);
    assert!(split.join("warmup_coco.json").exists());
}

#[test]
fn converts_label_studio_exports() {
    let temp = TempDir::new().unwrap();
    write_frames(&temp.path().join("frames"), "rally", 3);
    let tasks = r#"[{
        "id": 7,
        "data": {"video": "/data/upload/1/0badf00d-rally.mp4"},
        "annotations": [{"result": [{
            "id": "trk1",
            "type": "videorectangle",
            "from_name": "box",
            "to_name": "video",
            "value": {
                "labels": ["player"],
                "sequence": [
                    {"frame": 1, "enabled": true, "x": 10, "y": 10, "width": 10, "height": 10},
                    {"frame": 31, "enabled": true, "x": 20, "y": 10, "width": 10, "height": 10}
                ]
            }
        }]}]
    }]"#;
    fs::write(temp.path().join("tasks.json"), tasks).unwrap();

    trackport(temp.path())
        .args(["convert", "tasks.json", "--frames", "frames", "--output", "mot", "--no-detections"])
        .args(["--source-fps", "30", "--sampling-rate", "1", "--width", "100", "--height", "50"])
        .assert()
        .success();

    let sequence = temp.path().join("mot").join("rally");
    let gt = fs::read_to_string(sequence.join("gt").join("gt.txt")).unwrap();
    assert_eq!(
        gt,
        "1,1,10.00,5.00,10.00,5.00,1,-1,-1,-1\n2,1,20.00,5.00,10.00,5.00,1,-1,-1,-1\n"
    );
    assert!(!sequence.join("det").exists());
}

#[test]
fn prints_completions() {
    let temp = TempDir::new().unwrap();
    let assert = trackport(temp.path()).args(["completions", "bash"]).assert().success();

    assert!(String::from_utf8_lossy(&assert.get_output().stdout).contains("trackport"));
}
