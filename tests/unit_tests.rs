#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};
    use rs19_subset::{
        materialize, process_dataset, AnnotationKind, Idempotency, Materializer, Mode,
        Partition, RawStore, Split, SubsetConfig, SubsetError, TargetClasses,
    };
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};
    use std::fs;
    use std::path::Path;

    fn write_polygon_frame(root: &Path, frame_id: &str, objects: serde_json::Value) {
        let dir = root.join("jsons/rs19_val");
        fs::create_dir_all(&dir).unwrap();
        let record = json!({
            "frame": frame_id,
            "imgWidth": 200,
            "imgHeight": 100,
            "objects": objects,
        });
        fs::write(dir.join(format!("{}.json", frame_id)), record.to_string()).unwrap();
    }

    fn write_image(root: &Path, frame_id: &str) {
        let dir = root.join("jpgs/rs19_val");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.jpg", frame_id)), format!("jpeg bytes of {}", frame_id)).unwrap();
    }

    fn write_mask(root: &Path, frame_id: &str, mask: &GrayImage) {
        let dir = root.join("uint8/rs19_val");
        fs::create_dir_all(&dir).unwrap();
        mask.save(dir.join(format!("{}.png", frame_id))).unwrap();
    }

    fn person_rectangle() -> serde_json::Value {
        json!({"label": "person", "polygon": [[10, 10], [110, 10], [110, 60], [10, 60]]})
    }

    fn square_mask(value: u8) -> GrayImage {
        GrayImage::from_fn(100, 100, |x, y| {
            let inside = (40..60).contains(&x) && (40..60).contains(&y);
            Luma([if inside { value } else { 0 }])
        })
    }

    fn partition_of(train: &[&str], val: &[&str], test: &[&str]) -> Partition {
        let set = |ids: &[&str]| ids.iter().map(|id| id.to_string()).collect::<BTreeSet<_>>();
        Partition {
            train: set(train),
            val: set(val),
            test: set(test),
        }
    }

    #[test]
    fn test_polygon_pipeline_end_to_end() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();

        for i in 0..12 {
            let frame_id = format!("rs{:05}", i);
            let mut objects = vec![person_rectangle()];
            if i % 4 == 0 {
                objects.push(json!({"label": "person-group", "polygon": [[0, 0], [5, 0], [5, 5]]}));
            }
            write_polygon_frame(input.path(), &frame_id, json!(objects));
            write_image(input.path(), &frame_id);
        }
        write_polygon_frame(input.path(), "rs00100", json!([{"label": "car", "polygon": [[0, 0], [5, 0], [5, 5]]}]));
        write_image(input.path(), "rs00100");

        let config = SubsetConfig {
            input_root: input.path().to_path_buf(),
            output_root: output.path().to_path_buf(),
            target_classes: BTreeMap::from([("person".to_string(), 0)]),
            exclude: vec!["person-group".to_string()],
            ..SubsetConfig::default()
        };

        let run = process_dataset(&config).unwrap();
        assert_eq!(run.relevant_frames, 9);
        assert!(run.report.failures.is_empty());
        assert!(run.report.warnings.is_empty());

        let partition = run.partition.unwrap();
        assert_eq!(partition.len(), 9);
        assert!(partition.split_of("rs00000").is_none());
        assert!(partition.split_of("rs00100").is_none());

        for (split, frame_id) in partition.iter() {
            let label = fs::read_to_string(
                output
                    .path()
                    .join(format!("labels/{}/{}.txt", split, frame_id)),
            )
            .unwrap();
            assert_eq!(label, "0 0.300000 0.350000 0.500000 0.500000\n");
            assert!(output
                .path()
                .join(format!("images/{}/{}.jpg", split, frame_id))
                .is_file());
        }

        let yaml = fs::read_to_string(output.path().join("dataset.yaml")).unwrap();
        assert!(yaml.contains("    0: person"));

        // Same seed, same inputs: a rerun assigns identical membership
        let rerun = process_dataset(&config).unwrap();
        assert_eq!(rerun.partition.unwrap(), partition);
        assert_eq!(rerun.report.warnings.len(), 6);
        assert_eq!(rerun.report.stats.labels_skipped, 9);
        assert_eq!(rerun.report.stats.images_skipped, 9);
    }

    #[test]
    fn test_mask_square_yields_one_box() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_mask(input.path(), "f1", &square_mask(11));
        write_image(input.path(), "f1");

        let store = RawStore::new(input.path(), AnnotationKind::Mask);
        let targets = TargetClasses::new().with(11u8, 0);
        let report = materialize(
            &partition_of(&["f1"], &[], &[]),
            &store,
            output.path(),
            &targets,
            0,
        )
        .unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.stats.boxes_written, 1);
        let label = fs::read_to_string(output.path().join("labels/train/f1.txt")).unwrap();
        assert_eq!(label, "0 0.500000 0.500000 0.200000 0.200000\n");
    }

    #[test]
    fn test_mask_min_area_and_empty_label() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_mask(input.path(), "f1", &square_mask(11));
        write_image(input.path(), "f1");
        write_mask(input.path(), "f2", &square_mask(3));
        write_image(input.path(), "f2");

        let store = RawStore::new(input.path(), AnnotationKind::Mask);
        let targets = TargetClasses::new().with(11u8, 0);
        let report = materialize(
            &partition_of(&["f1"], &["f2"], &[]),
            &store,
            output.path(),
            &targets,
            401,
        )
        .unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(
            fs::read_to_string(output.path().join("labels/train/f1.txt")).unwrap(),
            ""
        );
        assert_eq!(
            fs::read_to_string(output.path().join("labels/val/f2.txt")).unwrap(),
            ""
        );
    }

    #[test]
    fn test_existing_label_is_not_rewritten() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_polygon_frame(input.path(), "f1", json!([person_rectangle()]));
        write_image(input.path(), "f1");

        let labels_dir = output.path().join("labels/train");
        fs::create_dir_all(&labels_dir).unwrap();
        let sentinel = b"sentinel content, not a YOLO label";
        fs::write(labels_dir.join("f1.txt"), sentinel).unwrap();

        let store = RawStore::new(input.path(), AnnotationKind::Polygon);
        let targets = TargetClasses::new().with("person", 0);
        let report = materialize(
            &partition_of(&["f1"], &[], &[]),
            &store,
            output.path(),
            &targets,
            0,
        )
        .unwrap();

        assert_eq!(fs::read(labels_dir.join("f1.txt")).unwrap(), sentinel);
        assert_eq!(report.stats.labels_skipped, 1);
        assert_eq!(report.stats.images_copied, 1);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.to_string().contains("already exists")));
    }

    #[test]
    fn test_content_idempotency_rewrites_stale_label() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_polygon_frame(input.path(), "f1", json!([person_rectangle()]));
        write_image(input.path(), "f1");

        let labels_dir = output.path().join("labels/train");
        fs::create_dir_all(&labels_dir).unwrap();
        fs::write(labels_dir.join("f1.txt"), "stale").unwrap();

        let store = RawStore::new(input.path(), AnnotationKind::Polygon);
        let targets = TargetClasses::new().with("person", 0);
        let report = Materializer::new(&store, output.path(), &targets)
            .with_idempotency(Idempotency::Content)
            .materialize(&partition_of(&["f1"], &[], &[]))
            .unwrap();

        assert_eq!(report.stats.labels_written, 1);
        assert_eq!(
            fs::read_to_string(labels_dir.join("f1.txt")).unwrap(),
            "0 0.300000 0.350000 0.500000 0.500000\n"
        );
    }

    #[test]
    fn test_missing_image_fails_only_that_frame() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for frame_id in ["f1", "f2", "f3"] {
            write_polygon_frame(input.path(), frame_id, json!([person_rectangle()]));
        }
        write_image(input.path(), "f1");
        write_image(input.path(), "f3");

        let store = RawStore::new(input.path(), AnnotationKind::Polygon);
        let targets = TargetClasses::new().with("person", 0);
        let report = materialize(
            &partition_of(&["f1", "f2"], &["f3"], &[]),
            &store,
            output.path(),
            &targets,
            0,
        )
        .unwrap();

        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.frame_id, "f2");
        assert_eq!(failure.split, Some(Split::Train));
        assert!(matches!(failure.error, SubsetError::MissingRawAsset { .. }));

        assert!(!output.path().join("images/train/f2.jpg").exists());
        assert!(!output.path().join("labels/train/f2.txt").exists());
        assert!(output.path().join("labels/train/f1.txt").is_file());
        assert!(output.path().join("images/val/f3.jpg").is_file());
        assert_eq!(report.stats.labels_written, 2);
        assert_eq!(report.stats.failed_frames, 1);
    }

    #[test]
    fn test_unsupported_record_is_reported() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let dir = input.path().join("jsons/rs19_val");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("f1.json"), r#"{"shapes": []}"#).unwrap();
        write_image(input.path(), "f1");

        let store = RawStore::new(input.path(), AnnotationKind::Polygon);
        let targets = TargetClasses::new().with("person", 0);
        let report = materialize(
            &partition_of(&[], &[], &["f1"]),
            &store,
            output.path(),
            &targets,
            0,
        )
        .unwrap();

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].error,
            SubsetError::UnsupportedLabelFormat { .. }
        ));
        assert!(!output.path().join("images/test/f1.jpg").exists());
    }

    #[test]
    fn test_invalid_ratios_abort_before_io() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let output_root = output.path().join("subset");

        let config = SubsetConfig {
            input_root: input.path().to_path_buf(),
            output_root: output_root.clone(),
            target_classes: BTreeMap::from([("person".to_string(), 0)]),
            train_ratio: 0.8,
            ..SubsetConfig::default()
        };

        assert!(matches!(
            process_dataset(&config),
            Err(SubsetError::InvalidRatios { .. })
        ));
        assert!(!output_root.exists());
    }

    #[test]
    fn test_negatives_mode_copies_frames_without_class() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_mask(input.path(), "with_human", &square_mask(11));
        write_image(input.path(), "with_human");
        write_mask(input.path(), "no_human", &square_mask(3));
        write_image(input.path(), "no_human");
        write_image(input.path(), "unlabelled");

        let config = SubsetConfig {
            input_root: input.path().to_path_buf(),
            output_root: output.path().join("rs19_no_human"),
            mode: Mode::Negatives,
            exclude: vec!["11".to_string()],
            ..SubsetConfig::default()
        };

        let run = process_dataset(&config).unwrap();
        assert!(run.partition.is_none());
        assert_eq!(run.relevant_frames, 2);
        assert!(run.report.failures.is_empty());

        let out = output.path().join("rs19_no_human");
        assert!(out.join("no_human.jpg").is_file());
        assert!(out.join("unlabelled.jpg").is_file());
        assert!(!out.join("with_human.jpg").exists());
    }

    #[test]
    fn test_negatives_mode_excludes_unreadable_masks() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_mask(input.path(), "no_human", &square_mask(3));
        write_image(input.path(), "no_human");
        write_image(input.path(), "corrupt");
        let mask_dir = input.path().join("uint8/rs19_val");
        fs::write(mask_dir.join("corrupt.png"), "not a png").unwrap();

        let config = SubsetConfig {
            input_root: input.path().to_path_buf(),
            output_root: output.path().join("rs19_no_human"),
            mode: Mode::Negatives,
            exclude: vec!["11".to_string()],
            ..SubsetConfig::default()
        };

        let run = process_dataset(&config).unwrap();
        assert_eq!(run.relevant_frames, 1);
        assert_eq!(run.report.failures.len(), 1);
        assert_eq!(run.report.failures[0].frame_id, "corrupt");
        assert_eq!(run.report.stats.failed_frames, 1);

        let out = output.path().join("rs19_no_human");
        assert!(out.join("no_human.jpg").is_file());
        assert!(!out.join("corrupt.jpg").exists());
    }

    #[test]
    fn test_negatives_mode_ignores_masks_without_image() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        write_mask(input.path(), "no_human", &square_mask(3));
        write_image(input.path(), "no_human");
        write_mask(input.path(), "mask_only", &square_mask(3));

        let config = SubsetConfig {
            input_root: input.path().to_path_buf(),
            output_root: output.path().join("rs19_no_human"),
            mode: Mode::Negatives,
            exclude: vec!["11".to_string()],
            ..SubsetConfig::default()
        };

        let run = process_dataset(&config).unwrap();
        assert_eq!(run.relevant_frames, 1);
        assert!(run.report.failures.is_empty());
        assert!(output.path().join("rs19_no_human/no_human.jpg").is_file());
    }

    #[test]
    fn test_mask_pipeline_selects_frames_with_class() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        for i in 0..6 {
            let frame_id = format!("m{}", i);
            let value = if i < 4 { 11 } else { 3 };
            write_mask(input.path(), &frame_id, &square_mask(value));
            write_image(input.path(), &frame_id);
        }

        let config = SubsetConfig {
            input_root: input.path().to_path_buf(),
            output_root: output.path().to_path_buf(),
            mode: Mode::Mask,
            target_classes: BTreeMap::from([("11".to_string(), 0)]),
            ..SubsetConfig::default()
        };

        let run = process_dataset(&config).unwrap();
        assert_eq!(run.relevant_frames, 4);
        let partition = run.partition.unwrap();
        assert!(partition
            .iter()
            .all(|(_, frame_id)| ["m0", "m1", "m2", "m3"].contains(&frame_id)));
        assert_eq!(run.report.stats.boxes_written, 4);
    }
}
