//! CLI command execution.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};

use super::output::OutputFormat;
use super::parser::{Cli, Commands};
use crate::error::{Error, Result};
use crate::pipeline::{Guards, Pipeline, PipelineInput, PipelineOptions, PipelineOutput};
use crate::prompt::{build_field_guide, compose_prompt};
use crate::resolve::NasBuilder;
use crate::schema::{derive_ai_schema, derive_nas_schema, merge_render_schema};
use crate::template::{NoteTemplate, validate_template};

/// Executes the parsed CLI command and returns its printable output.
///
/// # Errors
///
/// Propagates file, parse, and pipeline errors for `main` to format.
pub async fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    match &cli.command {
        Commands::Compile {
            template,
            source,
            tokens,
            fact_pack,
            output,
            mock,
            api_key,
            model,
            max_tokens,
            retries,
            strict,
        } => {
            let input = compile_input(
                template, source, tokens, fact_pack, *mock, model, *max_tokens, *retries, *strict,
            )?;
            let pipeline = build_pipeline(*mock, api_key.clone())?;
            let result = pipeline.run(input).await?;
            render_compile_output(&result, output.as_deref(), format)
        }
        Commands::Schemas { template } => {
            let template = read_template(template)?;
            validate_template(&template)?;
            let ais = derive_ai_schema(&template)?;
            let nas = derive_nas_schema(&template)?;
            let rps = merge_render_schema(&ais, &nas)?;
            let body = json!({
                "ais": ais.to_json_schema(),
                "nas": nas.to_json_schema(),
                "rps": rps.to_json_schema(),
            });
            Ok(serde_json::to_string_pretty(&body)?)
        }
        Commands::Prompt {
            template,
            source,
            fact_pack,
        } => {
            let template = read_template(template)?;
            validate_template(&template)?;
            let source = read_json(source)?;
            let fact_pack = fact_pack.as_deref().map(read_json).transpose()?;
            let ais = derive_ai_schema(&template)?;
            let resolution = NasBuilder::new().build(&template, &source);
            let guide = build_field_guide(&template);
            let (bundle, lint) = compose_prompt(
                &template,
                &ais,
                guide,
                &resolution.nas_data,
                fact_pack.as_ref(),
                "preview",
            );
            let body = json!({
                "bundle": bundle,
                "lint": {"errors": lint.errors, "warnings": lint.warnings},
                "resolutionWarnings": resolution.warnings,
            });
            Ok(serde_json::to_string_pretty(&body)?)
        }
    }
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn compile_input(
    template: &Path,
    source: &Path,
    tokens: &Option<PathBuf>,
    fact_pack: &Option<PathBuf>,
    mock: bool,
    model: &Option<String>,
    max_tokens: Option<u32>,
    retries: Option<u32>,
    strict: bool,
) -> Result<PipelineInput> {
    let template = read_template(template)?;
    let source = read_json(source)?;
    let mut options = PipelineOptions {
        mock_generation: mock,
        provenance: true,
        ..PipelineOptions::default()
    };
    if strict {
        options.guards = Guards::strict();
    }
    if let Some(model) = model {
        options.generation.model.clone_from(model);
    }
    if let Some(max_tokens) = max_tokens {
        options.generation.max_tokens = max_tokens;
    }
    if let Some(retries) = retries {
        options.generation.retries = retries;
    }
    Ok(PipelineInput {
        template,
        source_data: source,
        tokens: tokens.as_deref().map(read_json).transpose()?,
        fact_pack: fact_pack.as_deref().map(read_json).transpose()?,
        options,
    })
}

fn build_pipeline(mock: bool, api_key: Option<String>) -> Result<Pipeline> {
    if mock {
        return Ok(Pipeline::new());
    }
    #[cfg(feature = "openai")]
    {
        Pipeline::with_openai(api_key)
    }
    #[cfg(not(feature = "openai"))]
    {
        let _ = api_key;
        Err(Error::Config {
            message: "built without the openai feature; run with --mock or rebuild with \
                      --features openai"
                .to_string(),
        })
    }
}

fn render_compile_output(
    result: &PipelineOutput,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<String> {
    if let Some(path) = output {
        std::fs::write(path, &result.html)?;
        std::fs::write(path.with_extension("screen.css"), &result.css.screen)?;
        std::fs::write(path.with_extension("print.css"), &result.css.print)?;
    }

    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Text => {
            let mut summary = String::new();
            if output.is_some() {
                let warning_count = result.warnings.as_ref().map_or(0, crate::diag::PipelineWarnings::len);
                summary.push_str(&format!(
                    "compiled {} with {} ({} tokens, {} warnings)\n",
                    result.request_id, result.model, result.usage.total_tokens, warning_count
                ));
            } else {
                summary.push_str(&result.html);
            }
            Ok(summary)
        }
    }
}

fn read_template(path: &Path) -> Result<NoteTemplate> {
    let value = read_json(path)?;
    serde_json::from_value(value).map_err(Error::from)
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Serialization(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    fn fixture(dir: &tempfile::TempDir) -> (PathBuf, PathBuf) {
        let template = write_file(
            dir,
            "template.json",
            r#"{
                "id": "tmpl", "name": "Note", "version": "1.0.0",
                "layout": [{
                    "id": "sec", "type": "section",
                    "content": [
                        {"id": "name", "slot": "lookup", "lookup": "patient.name",
                         "targetPath": "header.patientName"},
                        {"id": "summary", "slot": "ai", "outputPath": "assessment.summary",
                         "aiDeps": ["header.patientName"]}
                    ]
                }],
                "prompt": {"system": "sys", "main": "main"}
            }"#,
        );
        let source = write_file(dir, "source.json", r#"{"patient": {"name": "Jane"}}"#);
        (template, source)
    }

    #[tokio::test]
    async fn test_compile_mock_to_stdout() {
        let dir = tempfile::TempDir::new().unwrap();
        let (template, source) = fixture(&dir);
        let cli = Cli::try_parse_from([
            "noteforge",
            "compile",
            template.to_str().unwrap(),
            source.to_str().unwrap(),
            "--mock",
        ])
        .unwrap();
        let out = execute(&cli).await.unwrap();
        assert!(out.contains("<article"));
        assert!(out.contains("Jane"));
    }

    #[tokio::test]
    async fn test_compile_writes_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let (template, source) = fixture(&dir);
        let out_path = dir.path().join("note.html");
        let cli = Cli::try_parse_from([
            "noteforge",
            "compile",
            template.to_str().unwrap(),
            source.to_str().unwrap(),
            "--mock",
            "--output",
            out_path.to_str().unwrap(),
        ])
        .unwrap();
        let summary = execute(&cli).await.unwrap();
        assert!(summary.contains("compiled"));
        assert!(out_path.exists());
        assert!(dir.path().join("note.screen.css").exists());
        assert!(dir.path().join("note.print.css").exists());
    }

    #[tokio::test]
    async fn test_schemas_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let (template, _) = fixture(&dir);
        let cli = Cli::try_parse_from(["noteforge", "schemas", template.to_str().unwrap()])
            .unwrap();
        let out = execute(&cli).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["ais"]["properties"]["assessment"].is_object());
        assert!(parsed["nas"]["properties"]["header"].is_object());
        assert!(parsed["rps"]["properties"]["assessment"].is_object());
    }

    #[tokio::test]
    async fn test_prompt_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let (template, source) = fixture(&dir);
        let cli = Cli::try_parse_from([
            "noteforge",
            "prompt",
            template.to_str().unwrap(),
            source.to_str().unwrap(),
        ])
        .unwrap();
        let out = execute(&cli).await.unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["bundle"]["messages"][0]["role"], "system");
        assert!(parsed["lint"]["errors"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let cli =
            Cli::try_parse_from(["noteforge", "schemas", "/nonexistent/t.json"]).unwrap();
        assert!(matches!(execute(&cli).await.unwrap_err(), Error::Io(_)));
    }
}
