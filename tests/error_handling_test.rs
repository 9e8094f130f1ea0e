/// Error classification as seen by callers of the packaging engine
#[cfg(test)]
mod tests {
    use packsmith::error::{is_retryable, ErrorKind, IoContext, PackagingError};
    use std::path::PathBuf;

    #[test]
    fn test_input_errors_are_not_retryable() {
        let errors = vec![
            PackagingError::SourceNotFound {
                path: PathBuf::from("./missing"),
            },
            PackagingError::UnsupportedLanguage {
                entryfile: "main.rb".to_string(),
            },
            PackagingError::InvalidWorkload {
                workload: "a/b".to_string(),
                reason: "name must be a non-empty single path segment".to_string(),
            },
        ];
        for err in &errors {
            assert_eq!(err.kind(), ErrorKind::Input);
            assert!(!is_retryable(err));
        }
    }

    #[test]
    fn test_tool_failure_is_not_retried() {
        let err = PackagingError::ExternalTool {
            tool: "nixpacks".to_string(),
            command: "nixpacks build .".to_string(),
            exit_code: None,
            output: "killed".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ExternalTool);
        assert!(!is_retryable(&err));
        assert!(err.to_string().contains("exit code none"));
    }

    #[test]
    fn test_io_context_names_the_path() {
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = result.at("/var/out/api.zip").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("/var/out/api.zip"));
    }

    #[test]
    fn test_unresolvable_manager_mentions_language() {
        let err = PackagingError::UnresolvablePackageManager {
            language: "python".to_string(),
            path: PathBuf::from("/src/app"),
            reason: "no lockfile".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("python"));
        assert!(msg.contains("/src/app"));
    }
}
