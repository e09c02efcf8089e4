#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;
use video_keyframes::{
    ExtractError, ExtractorConfig, KeyframeExtractor, OptimizationType, RunOptions,
};

/// Writing an executable while another test thread forks can fail with ETXTBSY.
static SERIAL: Mutex<()> = Mutex::new(());

const BANNER: &str = "Stream #0:0: Video: rawvideo, gray, 4x5, 25 fps";

/// Five 4x5 gray frames whose adjacent differences are 0.1, 0.9, 0.05, 0.8.
fn scenario_bytes() -> Vec<u8> {
    let masks: [Vec<usize>; 5] = [
        vec![],
        vec![0, 1],
        (0..20).collect(),
        (1..20).collect(),
        [0, 16, 17, 18, 19].to_vec(),
    ];
    masks
        .iter()
        .flat_map(|lit| (0..20).map(move |i| if lit.contains(&i) { 255u8 } else { 0 }))
        .collect()
}

struct MockDecoder {
    dir: TempDir,
    script: PathBuf,
}

impl MockDecoder {
    /// Decoder that prints `BANNER` when probed and streams `raw` when decoding.
    fn new(raw: &[u8], exit_code: i32) -> Self {
        Self::with_banner(raw, exit_code, BANNER)
    }

    fn with_banner(raw: &[u8], exit_code: i32, banner: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let raw_path = dir.path().join("frames.raw");
        fs::write(&raw_path, raw).unwrap();

        let script = dir.path().join("fake-ffmpeg");
        let body = format!(
            "#!/bin/sh\n\
             case \"$*\" in\n  \
             *rawvideo*) cat '{}'; exit {exit_code} ;;\n  \
             *) echo '{banner}' >&2; exit 1 ;;\n\
             esac\n",
            raw_path.display()
        );
        fs::write(&script, body).unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, script }
    }

    fn extractor(&self, threads: usize) -> KeyframeExtractor {
        KeyframeExtractor::new(ExtractorConfig::new(&self.script, threads, false)).unwrap()
    }

    fn video(&self) -> PathBuf {
        self.dir.path().join("clip.mp4")
    }
}

fn png_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".png"))
        .collect();
    names.sort();
    names
}

fn assert_decode_failure(result: Result<impl std::fmt::Debug, ExtractError>) {
    match result {
        Err(ExtractError::DecodeFailure { .. }) => {}
        other => panic!("expected DecodeFailure, got {other:?}"),
    }
}

#[test]
fn extract_frames_reads_every_frame() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let ex = mock.extractor(2);

    let (frames, width, height) = ex.extract_frames(&mock.video(), None).unwrap();
    assert_eq!((width, height), (4, 5));
    assert_eq!(frames.len(), 5);
    assert_eq!(frames[2].data(), &[255u8; 20][..]);
    assert!(frames.iter().enumerate().all(|(i, f)| f.frame_number() == i));

    let (limited, _, _) = ex.extract_frames(&mock.video(), Some(2)).unwrap();
    assert_eq!(limited.len(), 2);

    let picked = ex.extract_keyframes(&frames, 3, None, None).unwrap();
    assert_eq!(picked, vec![0, 2, 4]);
}

#[test]
fn process_video_writes_selected_frames() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("keyframes");

    let result = mock
        .extractor(1)
        .process_video(&mock.video(), &target, &RunOptions::new(3))
        .unwrap();

    assert_eq!(result.total_frames(), 5);
    assert_eq!(result.keyframes_extracted(), 3);
    assert_eq!(result.max_keyframes_requested(), 3);
    assert_eq!(result.video_file(), "clip.mp4");
    assert_eq!(result.threads_used(), 1);
    assert_eq!(
        png_names(&target),
        vec!["keyframe_000000.png", "keyframe_000002.png", "keyframe_000004.png"]
    );

    let image = image::open(target.join("keyframe_000002.png")).unwrap().into_luma8();
    assert_eq!(image.dimensions(), (4, 5));
    assert!(image.pixels().all(|p| p.0[0] == 255));
}

#[test]
fn process_video_respects_max_save_and_scalar_mode() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let out = tempfile::tempdir().unwrap();

    let options = RunOptions {
        max_save: Some(2),
        use_simd: Some(false),
        ..RunOptions::new(3)
    };
    let result = mock.extractor(3).process_video(&mock.video(), out.path(), &options).unwrap();

    assert_eq!(result.keyframes_extracted(), 3);
    assert_eq!(result.optimization_type(), OptimizationType::Scalar);
    assert!(!result.simd_enabled());
    let written = png_names(out.path());
    assert_eq!(written, vec!["keyframe_000000.png", "keyframe_000002.png"]);
    assert_eq!(options.save_limit(result.keyframes_extracted()), written.len());
}

#[test]
fn file_names_are_stable_across_runs() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    mock.extractor(1).process_video(&mock.video(), first.path(), &RunOptions::new(2)).unwrap();
    mock.extractor(4).process_video(&mock.video(), second.path(), &RunOptions::new(2)).unwrap();

    assert_eq!(png_names(first.path()), png_names(second.path()));
    assert_eq!(png_names(first.path()), vec!["keyframe_000000.png", "keyframe_000002.png"]);
}

#[test]
fn save_keyframes_redecodes_requested_indices() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let out = tempfile::tempdir().unwrap();
    let ex = mock.extractor(2);

    let saved = ex.save_keyframes(&mock.video(), &[4, 0, 2], out.path(), Some(2)).unwrap();
    assert_eq!(saved, 2);
    assert_eq!(png_names(out.path()), vec!["keyframe_000000.png", "keyframe_000002.png"]);

    let saved = ex.save_keyframes(&mock.video(), &[1, 9], out.path(), None).unwrap();
    assert_eq!(saved, 1);
    assert!(out.path().join("keyframe_000001.png").exists());

    assert_eq!(ex.save_keyframes(&mock.video(), &[], out.path(), None).unwrap(), 0);
}

#[test]
fn save_keyframes_skips_indices_past_the_end() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let out = tempfile::tempdir().unwrap();
    let ex = mock.extractor(1);

    let saved = ex.save_keyframes(&mock.video(), &[1, usize::MAX], out.path(), None).unwrap();
    assert_eq!(saved, 1);
    assert_eq!(png_names(out.path()), vec!["keyframe_000001.png"]);

    let saved = ex.save_keyframes(&mock.video(), &[usize::MAX], out.path(), None).unwrap();
    assert_eq!(saved, 0);
}

#[test]
fn benchmark_reports_without_writing() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);

    let result = mock
        .extractor(2)
        .benchmark(&mock.video(), "mock run", &RunOptions::new(3))
        .unwrap();
    assert_eq!(result.test_name(), "mock run");
    assert_eq!(result.total_frames(), 5);
    assert_eq!(result.keyframes_extracted(), 3);
    assert!((result.keyframe_ratio() - 0.6).abs() < 1e-12);
    assert_eq!(png_names(mock.dir.path()), Vec::<String>::new());
}

#[test]
fn missing_decoder_is_a_decode_failure() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let ex = KeyframeExtractor::new(ExtractorConfig::new("/nonexistent/ffmpeg", 1, false)).unwrap();
    assert_decode_failure(ex.extract_frames(Path::new("clip.mp4"), None));
}

#[test]
fn failing_decoder_is_a_decode_failure() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 3);
    let out = tempfile::tempdir().unwrap();
    let ex = mock.extractor(2);

    assert_decode_failure(ex.extract_frames(&mock.video(), None));
    assert_decode_failure(ex.process_video(&mock.video(), out.path(), &RunOptions::new(3)));
    assert!(png_names(out.path()).is_empty());
}

#[test]
fn truncated_output_is_a_decode_failure() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mut raw = scenario_bytes();
    raw.truncate(20 * 2 + 7);
    let mock = MockDecoder::new(&raw, 0);

    assert_decode_failure(mock.extractor(1).extract_frames(&mock.video(), None));
}

#[test]
fn empty_output_is_a_decode_failure() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&[], 0);
    assert_decode_failure(mock.extractor(1).extract_frames(&mock.video(), None));
}

#[test]
fn unparsable_probe_is_a_decode_failure() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::with_banner(&scenario_bytes(), 0, "Stream #0:0: Audio: pcm_s16le");
    assert_decode_failure(mock.extractor(1).extract_frames(&mock.video(), None));
}

#[test]
fn zero_frame_limit_is_rejected() {
    let _guard = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let mock = MockDecoder::new(&scenario_bytes(), 0);
    let err = mock.extractor(1).extract_frames(&mock.video(), Some(0)).unwrap_err();
    assert!(matches!(err, ExtractError::InvalidParameter(_)));
}
