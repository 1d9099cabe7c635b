#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::models::RecordKind;
    use crate::test::utils::{read_lines, write_csv};
    use crate::upload::{
        allowed_file, check_columns, normalize_score_name, normalize_score_value,
        normalize_scores, prepare_upload, upload_path, validate_upload,
    };
    use tempfile::TempDir;

    fn validation_message(result: Result<(), AppError>) -> String {
        match result {
            Err(AppError::Validation(msg)) => msg,
            other => panic!("Expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_matching_columns_pass() {
        assert!(check_columns(&["name", "password", "class"], &["name", "password", "class"]).is_ok());
        assert!(check_columns(&["name", "subject", "score"], RecordKind::Score.upload_columns()).is_ok());
    }

    #[test]
    fn test_column_count_mismatch() {
        let msg = validation_message(check_columns(
            &["name", "password"],
            RecordKind::Student.upload_columns(),
        ));
        assert_eq!(msg, "CSV file has 2 columns, expected 3 columns");

        let msg = validation_message(check_columns(
            &["name", "password", "class", "extra"],
            RecordKind::Student.upload_columns(),
        ));
        assert_eq!(msg, "CSV file has 4 columns, expected 3 columns");
    }

    #[test]
    fn test_first_mismatching_column_is_reported() {
        let msg = validation_message(check_columns(
            &["name", "class", "password"],
            RecordKind::Student.upload_columns(),
        ));
        assert_eq!(
            msg,
            "CSV file has class column at position 2, expected password column"
        );

        let msg = validation_message(check_columns(
            &["Name", "subject", "points"],
            RecordKind::Score.upload_columns(),
        ));
        assert_eq!(msg, "CSV file has Name column at position 1, expected name column");
    }

    #[test]
    fn test_validate_upload_keeps_valid_file() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(dir.path(), "students.csv", "name,password,class\nalice,pw,1A\n");

        validate_upload(&path, RecordKind::Student).expect("Valid file should pass");

        assert!(path.exists(), "Valid upload should stay in place");
    }

    #[test]
    fn test_validate_upload_removes_rejected_file() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(dir.path(), "students.csv", "name,class,password\nalice,1A,pw\n");

        let msg = validation_message(validate_upload(&path, RecordKind::Student));

        assert!(msg.contains("expected password column"));
        assert!(!path.exists(), "Rejected upload should be removed");
    }

    #[test]
    fn test_validate_upload_rejects_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(dir.path(), "empty.csv", "");

        let msg = validation_message(validate_upload(&path, RecordKind::Score));

        assert_eq!(msg, "CSV file has 0 columns, expected 3 columns");
        assert!(!path.exists());
    }

    #[test]
    fn test_normalize_score_value() {
        assert_eq!(normalize_score_value("85pts"), "85");
        assert_eq!(normalize_score_value("85%"), "85");
        assert_eq!(normalize_score_value("85 pts"), "85");
        assert_eq!(normalize_score_value("9.5"), "95");
        assert_eq!(normalize_score_value("n/a"), "");
    }

    #[test]
    fn test_normalize_score_name() {
        assert_eq!(normalize_score_name("student_5").as_deref(), Some("student5"));
        assert_eq!(normalize_score_name("alex3").as_deref(), Some("student3"));
        assert_eq!(normalize_score_name("x").as_deref(), Some("studentx"));
        assert_eq!(normalize_score_name(""), None);
    }

    #[test]
    fn test_normalize_scores_rewrites_file() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(
            dir.path(),
            "scores.csv",
            "name,subject,score\nstudent_1,math,85pts\nalex_2,english,90%\n",
        );

        normalize_scores(&path).expect("Normalization should succeed");

        assert_eq!(
            read_lines(&path),
            vec!["name,subject,score", "student1,math,85", "student2,english,90"]
        );
    }

    #[test]
    fn test_prepare_upload_discards_score_file_with_empty_name() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(dir.path(), "scores.csv", "name,subject,score\n,math,80\n");

        let msg = validation_message(prepare_upload(&path, RecordKind::Score));

        assert_eq!(msg, "CSV file row 1 has an empty name");
        assert!(!path.exists());
    }

    #[test]
    fn test_prepare_upload_leaves_student_rows_untouched() {
        let dir = TempDir::new().unwrap();
        let contents = "name,password,class\nstudent_1,pw,1A\n";
        let path = write_csv(dir.path(), "students.csv", contents);

        prepare_upload(&path, RecordKind::Student).expect("Valid student file");

        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
    }

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("students.csv"));
        assert!(allowed_file("SCORES.CSV"));
        assert!(allowed_file("archive.2024.csv"));
        assert!(!allowed_file("students.xlsx"));
        assert!(!allowed_file("csv"));
        assert!(!allowed_file(""));
    }

    #[test]
    fn test_upload_paths_are_unique() {
        let dir = TempDir::new().unwrap();
        let first = upload_path(dir.path(), RecordKind::Score);
        let second = upload_path(dir.path(), RecordKind::Score);

        assert_ne!(first, second);
        assert!(
            first
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("score-") && n.ends_with(".csv"))
        );
    }
}
