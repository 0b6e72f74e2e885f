mod common;

use common::*;
use image::AnimationDecoder;
use image::codecs::gif::GifDecoder;
use std::fs::File;
use std::io::BufReader;

fn pipeline(yaml: &str, input: &std::path::Path, output: &std::path::Path) -> Pipeline {
    Pipeline::from_config(&config(yaml), &StageRegistry::builtin(), input, output).expect("Failed to build pipeline")
}

#[test]
fn photo_without_detections_reports_one_empty_frame() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let output = tempfile::TempDir::new()?;
    let photo = write_blank_png(input.path(), "blank.png");

    let mut pipeline = pipeline(REPORT_ONLY, input.path(), output.path());
    let FileOutcome::Completed(summary) = pipeline.process_file(&photo)? else {
        panic!("photo was skipped");
    };
    assert_eq!(summary.kind, MediaKind::Photo);
    assert_eq!(summary.frames, 1);

    let report = read_report(&output.path().join("blank.json"));
    assert_eq!(report.kind, MediaKind::Photo);
    assert_eq!(report.frames.len(), 1);
    assert_eq!(report.frames[0].frame, 0);
    assert!(report.frames[0].stages["blobs"].is_empty());
    Ok(())
}

#[test]
fn recognizer_rescans_detector_regions_on_every_frame() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let output = tempfile::TempDir::new()?;
    let video = write_moving_square_gif(input.path(), "clips/clip.gif", 3);

    let mut pipeline = pipeline(DETECT_AND_CLASSIFY, input.path(), output.path());
    let FileOutcome::Completed(summary) = pipeline.process_file(&video)? else {
        panic!("video was skipped");
    };
    assert_eq!(summary.kind, MediaKind::Video);
    assert_eq!(summary.frames, 3);

    let report_path = output.path().join("clips/clip.json");
    assert_eq!(summary.artifacts["report"].file.as_deref(), Some(report_path.as_path()));

    let report = read_report(&report_path);
    assert_eq!(report.kind, MediaKind::Video);
    let indices: Vec<_> = report.frames.iter().map(|f| f.frame).collect();
    assert_eq!(indices, [0, 1, 2]);

    let bounds = Rect::full(WIDTH, HEIGHT).unwrap();
    for frame in &report.frames {
        let blobs = &frame.stages["blobs"];
        let tones = &frame.stages["tone"];
        assert!(!blobs.is_empty(), "no blobs on frame {}", frame.frame);
        assert!(blobs.iter().all(|b| b.labels[0].confidence.is_some_and(|c| c > 0.0 && c <= 1.0)));
        assert_eq!(tones.len(), blobs.len());

        for tone in tones {
            assert!(bounds.contains(&tone.rect));
            assert!(
                blobs.iter().any(|b| b.rect.contains(&tone.rect)),
                "tone region {:?} outside every blob on frame {}",
                tone.rect,
                frame.frame
            );
            let label = tone.labels[0].label.as_str();
            assert!(label == "dark" || label == "light", "unexpected label {}", label);
        }
    }
    Ok(())
}

#[test]
fn identical_runs_give_identical_reports() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let video = write_moving_square_gif(input.path(), "clip.gif", 2);

    let mut reports = Vec::new();
    for _ in 0..2 {
        let output = tempfile::TempDir::new()?;
        pipeline(DETECT_AND_CLASSIFY, input.path(), output.path()).process_file(&video)?;
        let text = std::fs::read_to_string(output.path().join("clip.json"))?;
        reports.push(text);
    }
    assert_eq!(reports[0], reports[1]);
    Ok(())
}

#[test]
fn bad_file_does_not_poison_the_next_one() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let output = tempfile::TempDir::new()?;
    let bad = write_gray_alpha_png(input.path(), "bad.png");
    let good = write_square_png(input.path(), "good.png");

    let mut pipeline = pipeline(REPORT_ONLY, input.path(), output.path());
    let err = pipeline.process_file(&bad).unwrap_err();
    assert!(format!("{:#}", err).contains("channels"));
    assert!(!output.path().join("bad.json").exists());

    assert!(matches!(pipeline.process_file(&good)?, FileOutcome::Completed(_)));
    let report = read_report(&output.path().join("good.json"));
    assert_eq!(report.frames.len(), 1);
    assert!(!report.frames[0].stages["blobs"].is_empty());
    Ok(())
}

#[test]
fn unreadable_media_is_skipped() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let output = tempfile::TempDir::new()?;
    let notes = write_text_file(input.path(), "notes.txt");

    let mut pipeline = pipeline(REPORT_ONLY, input.path(), output.path());
    assert_eq!(pipeline.process_file(&notes)?, FileOutcome::Skipped);
    assert!(!output.path().join("notes.json").exists());
    Ok(())
}

#[test]
fn writers_mirror_the_input_tree() -> anyhow::Result<()> {
    let input = tempfile::TempDir::new()?;
    let output = tempfile::TempDir::new()?;
    let photo = write_square_png(input.path(), "stills/a.png");
    let video = write_moving_square_gif(input.path(), "clips/run.gif", 3);

    let yaml = r#"
pipeline:
  - { type: contourdetector, name: blobs, inputs: [files], params: { outputlabel: blob } }
  - { type: photowriter, name: photos, inputs: [blobs] }
  - { type: framewriter, name: frames, inputs: [blobs], params: { format: png } }
  - { type: videowriter, name: video, inputs: [blobs] }
"#;
    let mut pipeline = pipeline(yaml, input.path(), output.path());
    pipeline.process_file(&photo)?;
    pipeline.process_file(&video)?;

    assert!(output.path().join("stills/a-annotated.png").is_file());
    assert!(!output.path().join("stills/a-annotated.gif").exists());
    for i in 0..3 {
        assert!(output.path().join(format!("clips/run-frame-{}-annotated.png", i)).is_file());
    }

    let gif = output.path().join("clips/run-annotated.gif");
    let decoder = GifDecoder::new(BufReader::new(File::open(&gif)?))?;
    assert_eq!(decoder.into_frames().count(), 3);
    Ok(())
}
