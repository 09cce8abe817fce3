use super::{
    CommandExecutor, ConversionError, ConversionOptions, ConvertedDocument, Converter,
};
use crate::models::DoclingDocument;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Runs the `docling` command line tool and reads the JSON it writes.
pub struct DoclingCliConverter {
    program: String,
    /// Leading arguments from the command string, e.g. `run docling` for `uv run docling`.
    base_args: Vec<String>,
    executor: CommandExecutor,
    scratch_root: Option<PathBuf>,
}

impl DoclingCliConverter {
    /// `command` may carry a launcher prefix (`"uv run docling"`); it is split on whitespace.
    pub fn new(
        command: &str,
        executor: CommandExecutor,
        scratch_root: Option<PathBuf>,
    ) -> Result<Self, ConversionError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| ConversionError::NotConfigured("DOCLING_BIN is empty".to_string()))?;

        Ok(Self {
            program,
            base_args: parts.collect(),
            executor,
            scratch_root,
        })
    }

    fn scratch_dir(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docling-");
        match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
    }

    fn command_args(&self, input: &Path, output_dir: &Path, options: &ConversionOptions) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.base_args.iter().map(OsString::from).collect();
        args.extend(conversion_args(input, output_dir, options));
        args
    }
}

/// Docling CLI arguments for one conversion, input path last.
pub fn conversion_args(
    input: &Path,
    output_dir: &Path,
    options: &ConversionOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--to".into(),
        "json".into(),
        "--image-export-mode".into(),
        "embedded".into(),
        "--output".into(),
        output_dir.as_os_str().to_owned(),
    ];

    args.push(if options.do_ocr { "--ocr" } else { "--no-ocr" }.into());
    args.push(if options.do_table_structure { "--tables" } else { "--no-tables" }.into());
    if options.do_picture_description {
        args.push("--enrich-picture-description".into());
    }

    args.push(input.as_os_str().to_owned());
    args
}

#[async_trait]
impl Converter for DoclingCliConverter {
    fn name(&self) -> &str {
        "docling-cli"
    }

    async fn convert(
        &self,
        input: &Path,
        options: &ConversionOptions,
    ) -> Result<ConvertedDocument, ConversionError> {
        let workdir = self.scratch_dir()?;
        let args = self.command_args(input, workdir.path(), options);

        tracing::info!(
            input = ?input,
            do_ocr = options.do_ocr,
            do_table_structure = options.do_table_structure,
            do_picture_description = options.do_picture_description,
            "Running docling"
        );

        self.executor
            .execute(&self.program, &args, Some(workdir.path()))
            .await?;

        let stem = input
            .file_stem()
            .ok_or_else(|| ConversionError::InvalidOutput(format!("input has no file name: {:?}", input)))?;
        let json_path = workdir
            .path()
            .join(format!("{}.json", stem.to_string_lossy()));

        let raw = tokio::fs::read(&json_path).await.map_err(|e| {
            ConversionError::InvalidOutput(format!(
                "docling produced no JSON at {}: {}",
                json_path.display(),
                e
            ))
        })?;

        let document: DoclingDocument = serde_json::from_slice(&raw)
            .map_err(|e| ConversionError::InvalidOutput(format!("unparseable docling JSON: {}", e)))?;

        tracing::debug!(
            texts = document.texts.len(),
            tables = document.tables.len(),
            pictures = document.pictures.len(),
            "Docling output parsed"
        );

        Ok(ConvertedDocument::with_workdir(document, workdir))
    }

    async fn health_check(&self) -> Result<(), ConversionError> {
        let mut args = self.base_args.clone();
        args.push("--version".to_string());
        self.executor.execute(&self.program, &args, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn default_options_enable_ocr_and_tables() {
        let args = conversion_args(
            Path::new("/tmp/in.pdf"),
            Path::new("/tmp/out"),
            &ConversionOptions::default(),
        );

        assert_eq!(
            strings(&args),
            vec![
                "--to", "json", "--image-export-mode", "embedded", "--output", "/tmp/out",
                "--ocr", "--tables", "/tmp/in.pdf"
            ]
        );
    }

    #[test]
    fn picture_description_adds_enrichment_flag() {
        let options = ConversionOptions {
            do_ocr: false,
            do_table_structure: false,
            do_picture_description: true,
            request_id: None,
        };
        let args = strings(&conversion_args(Path::new("a.docx"), Path::new("o"), &options));

        assert!(args.contains(&"--no-ocr".to_string()));
        assert!(args.contains(&"--no-tables".to_string()));
        assert!(args.contains(&"--enrich-picture-description".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("a.docx"));
    }

    #[test]
    fn launcher_prefix_is_kept_before_docling_args() {
        let converter = DoclingCliConverter::new(
            "uv run docling",
            CommandExecutor::new(Duration::from_secs(1)),
            None,
        )
        .unwrap();

        assert_eq!(converter.program, "uv");
        let args = strings(&converter.command_args(
            Path::new("x.pdf"),
            Path::new("out"),
            &ConversionOptions::default(),
        ));
        assert_eq!(&args[..3], &["run", "docling", "--to"]);
    }

    #[test]
    fn empty_command_is_not_configured() {
        let result = DoclingCliConverter::new("  ", CommandExecutor::new(Duration::from_secs(1)), None);
        assert!(matches!(result, Err(ConversionError::NotConfigured(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn reads_json_written_by_the_tool() {
        let scratch = tempfile::tempdir().unwrap();
        let script = scratch.path().join("fake-docling.sh");
        std::fs::write(
            &script,
            r#"
out=""
input=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift 2 ;;
    --to|--image-export-mode) shift 2 ;;
    --*) shift ;;
    *) input="$1"; shift ;;
  esac
done
stem=$(basename "$input")
stem="${stem%.*}"
printf '%s' '{"texts":[{"label":"text","text":"from the tool","prov":[{"page_no":1}]}]}' > "$out/$stem.json"
"#,
        )
        .unwrap();
        let input = scratch.path().join("upload.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        let command = format!("sh {}", script.display());
        let converter = DoclingCliConverter::new(
            &command,
            CommandExecutor::new(Duration::from_secs(10)),
            Some(scratch.path().to_path_buf()),
        )
        .unwrap();

        let converted = converter
            .convert(&input, &ConversionOptions::default())
            .await
            .unwrap();

        assert_eq!(converted.document.texts[0].text, "from the tool");
        let workdir = converted.base_dir().unwrap().to_path_buf();
        assert!(workdir.starts_with(scratch.path()));

        drop(converted);
        assert!(!workdir.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_json_is_invalid_output() {
        let scratch = tempfile::tempdir().unwrap();
        let input = scratch.path().join("upload.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();

        let converter = DoclingCliConverter::new(
            "true",
            CommandExecutor::new(Duration::from_secs(10)),
            Some(scratch.path().to_path_buf()),
        )
        .unwrap();

        let err = converter
            .convert(&input, &ConversionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidOutput(_)));
    }
}
