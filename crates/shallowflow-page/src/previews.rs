//! Offline preview generation for the static placeholders shown before a run.

use std::path::{Path, PathBuf};

use base64::Engine;
use tracing::{error, info, warn};

use shallowflow_core::execution::PlotType;
use shallowflow_core::{Result, ShallowFlowError};

use crate::manifest::{MANIFEST_FILE, SnippetManifest};
use crate::session::Session;

#[derive(Debug, Default)]
pub struct PreviewReport {
    pub written: Vec<PathBuf>,
    /// Snippet name and the reason it produced no preview.
    pub skipped: Vec<(String, String)>,
    pub manifest: PathBuf,
}

/// Run every snippet in `snippets_dir` and write its artifact to `out_dir`.
///
/// Each snippet runs in a fresh interpreter scope. Charts are written as
/// `<name>.json`, images as `<name>.png`. A snippet that fails or draws
/// nothing is skipped. The manifest always lists every
/// snippet found.
pub async fn generate_previews(
    session: &Session,
    snippets_dir: &Path,
    out_dir: &Path,
) -> Result<PreviewReport> {
    tokio::fs::create_dir_all(out_dir).await?;
    let manifest = SnippetManifest::scan(snippets_dir).await?;
    let mut report = PreviewReport::default();
    if manifest.is_empty() {
        warn!(dir = %snippets_dir.display(), "No snippets found");
    }

    for name in manifest.names() {
        info!(snippet = %name, "Generating preview");
        match render_one(session, snippets_dir, out_dir, name).await {
            Ok(path) => {
                info!(snippet = %name, path = %path.display(), "Preview saved");
                report.written.push(path);
            }
            Err(reason) => {
                warn!(snippet = %name, %reason, "Preview skipped");
                report.skipped.push((name.clone(), reason));
            }
        }
    }

    report.manifest = out_dir.join(MANIFEST_FILE);
    manifest.save(&report.manifest).await?;
    info!(
        path = %report.manifest.display(),
        written = report.written.len(),
        skipped = report.skipped.len(),
        "Manifest saved"
    );
    Ok(report)
}

async fn render_one(
    session: &Session,
    snippets_dir: &Path,
    out_dir: &Path,
    name: &str,
) -> std::result::Result<PathBuf, String> {
    let code = tokio::fs::read_to_string(snippets_dir.join(format!("{name}.py")))
        .await
        .map_err(|e| e.to_string())?;
    session.reset_scope().await.map_err(|e| e.to_string())?;
    let result = session
        .process_code(&code)
        .await
        .map_err(|e| e.to_string())?;

    if !result.is_success() {
        error!(snippet = %name, "Python Traceback:\n{}", result.console_output);
        return Err(ShallowFlowError::script(result.console_output).to_string());
    }

    let (path, bytes) = match (result.plot_type, result.payload) {
        (PlotType::Interactive, Some(json)) => (out_dir.join(format!("{name}.json")), json.into_bytes()),
        (PlotType::Image, Some(b64)) => {
            let png = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| format!("invalid image payload: {e}"))?;
            (out_dir.join(format!("{name}.png")), png)
        }
        _ => return Err("snippet produced no figure".to_string()),
    };

    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| e.to_string())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shallowflow_core::execution::ExecutionResult;

    use super::*;
    use crate::fake::{python_available, FakeInterpreter, FakeLauncher, RecordingHost, StaticFetcher};
    use crate::python::PythonLauncher;
    use crate::session::{EngineSource, SessionCell, SessionSettings, BUNDLED_ENGINE, RESET_SCOPE};

    async fn session(interpreter: Arc<FakeInterpreter>) -> Session {
        let cell = SessionCell::new(
            Arc::new(FakeLauncher::new(interpreter, Duration::ZERO)),
            Arc::new(StaticFetcher::default()),
            Arc::new(RecordingHost::default()),
            SessionSettings {
                packages: Vec::new(),
                install_packages: false,
                engine: EngineSource::Embedded("def process_code(c): ...".into()),
                install_timeout: Duration::from_secs(5),
                fetch_timeout: Duration::from_secs(5),
                execute_timeout: Duration::from_secs(5),
            },
        );
        cell.get_session().await.unwrap()
    }

    #[tokio::test]
    async fn test_writes_artifacts_and_manifest() {
        let snippets = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for name in ["a_chart.py", "b_image.py", "c_broken.py", "d_quiet.py"] {
            std::fs::write(snippets.path().join(name), format!("# {name}")).unwrap();
        }

        let interpreter = Arc::new(FakeInterpreter::default());
        interpreter.reply(&ExecutionResult::success(
            PlotType::Interactive,
            Some(r#"{"data":[],"layout":{}}"#.into()),
            "",
        ));
        interpreter.reply(&ExecutionResult::success(
            PlotType::Image,
            Some("iVBORw0KGgo=".into()),
            "",
        ));
        interpreter.reply(&ExecutionResult::error("Traceback\nZeroDivisionError: division by zero\n"));
        interpreter.reply(&ExecutionResult::success(PlotType::None, None, "hi\n"));

        let session = session(interpreter.clone()).await;
        let report = generate_previews(&session, snippets.path(), out.path())
            .await
            .unwrap();

        assert_eq!(
            report.written,
            vec![out.path().join("a_chart.json"), out.path().join("b_image.png")]
        );
        let skipped: Vec<&str> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(skipped, vec!["c_broken", "d_quiet"]);
        assert!(report.skipped[0].1.contains("ZeroDivisionError"));

        let png = std::fs::read(out.path().join("b_image.png")).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert_eq!(
            std::fs::read_to_string(out.path().join("snippets.json")).unwrap(),
            r#"["a_chart","b_image","c_broken","d_quiet"]"#
        );
        assert_eq!(interpreter.codes.lock().unwrap()[0], "# a_chart.py");

        let scripts = interpreter.scripts.lock().unwrap().clone();
        let resets = scripts.iter().filter(|s| s.as_str() == RESET_SCOPE).count();
        assert_eq!(resets, 4);
    }

    #[tokio::test]
    async fn test_empty_dir_writes_empty_manifest() {
        let snippets = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();

        let session = session(Arc::new(FakeInterpreter::default())).await;
        let report = generate_previews(&session, snippets.path(), out.path())
            .await
            .unwrap();

        assert!(report.written.is_empty());
        assert!(report.skipped.is_empty());
        assert_eq!(std::fs::read_to_string(&report.manifest).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_figure_does_not_leak_into_next_snippet() {
        if !python_available().await {
            return;
        }
        let snippets = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::write(
            snippets.path().join("a.py"),
            "class Chart:\n    def to_json(self):\n        return '{\"data\": []}'\n\nfig = Chart()\n",
        )
        .unwrap();
        std::fs::write(snippets.path().join("b.py"), "print('no figure here')\n").unwrap();

        let cell = SessionCell::new(
            Arc::new(PythonLauncher::new("python3")),
            Arc::new(StaticFetcher::default()),
            Arc::new(RecordingHost::default()),
            SessionSettings {
                packages: Vec::new(),
                install_packages: false,
                engine: EngineSource::Embedded(BUNDLED_ENGINE.to_string()),
                install_timeout: Duration::from_secs(30),
                fetch_timeout: Duration::from_secs(5),
                execute_timeout: Duration::from_secs(30),
            },
        );
        let session = cell.get_session().await.unwrap();
        let report = generate_previews(&session, snippets.path(), out.path())
            .await
            .unwrap();

        assert_eq!(report.written, vec![out.path().join("a.json")]);
        let skipped: Vec<&str> = report.skipped.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(skipped, vec!["b"]);
        assert!(!out.path().join("b.json").exists());
    }
}
