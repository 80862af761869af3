//! Operational status artifact.
//!
//! A short text block read by the external monitoring panel. It is rewritten
//! on every run, never appended, and is delimited by `INÍCIO`/`FIM` markers:
//!
//! ```text
//! ===== INÍCIO 02/09/2025 08:00:05 =====
//! 02/09/2025 08:00:05 | 🟢 OK | Nenhuma alteração detectada | em 00:00:05
//!
//! 📊 Resumo:
//! - 📊 Leiautes novos: 0
//!
//! ℹ️ Log completo: logs/monitor_20250902.log
//! ===== FIM 02/09/2025 08:00:05 =====
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::error::Result;
use crate::models::RunResult;
use crate::utils::truncate_graphemes;

const MAX_RECENT_ITEMS: usize = 3;
const MAX_ITEM_CHARS: usize = 120;

/// Panel status; the numeric code is what dashboards key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Warning,
    Error,
}

impl StatusCode {
    pub fn code(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Error => 2,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "AVISO",
            Self::Error => "ERRO",
        }
    }

    fn emoji(&self) -> &'static str {
        match self {
            Self::Ok => "🟢",
            Self::Warning => "🟡",
            Self::Error => "🔴",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.emoji(), self.label())
    }
}

/// Content of one status artifact.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub code: StatusCode,
    pub headline: String,
    pub extra: Option<String>,
    /// Ordered key/value summary
    pub summary: Vec<(String, String)>,
    /// Example items, at most three are rendered
    pub recent: Vec<String>,
    pub log_path: PathBuf,
}

impl StatusReport {
    /// Summarize a completed run.
    pub fn from_run(result: &RunResult, page_labels: &[String], log_path: impl Into<PathBuf>) -> Self {
        let elapsed = format_duration(result.elapsed);
        let new_layouts = result.pages_with_date.len();
        let changed = result.verdicts.len();

        let (code, mut headline, extra) = if new_layouts > 0 {
            (
                StatusCode::Ok,
                format!(
                    "{}, {} | em {}",
                    plural(new_layouts, "leiaute novo", "leiautes novos"),
                    plural(changed, "documento alterado", "documentos alterados"),
                    elapsed
                ),
                None,
            )
        } else if changed > 0 {
            (
                StatusCode::Warning,
                format!("Link(s) alterado(s), sem data nova | em {elapsed}"),
                Some(
                    "🛈 AVISO TÉCNICO: link(s) foram alterados no Bacen, mesmo sem data nova"
                        .to_string(),
                ),
            )
        } else {
            (
                StatusCode::Ok,
                format!("Nenhuma alteração detectada | em {elapsed}"),
                None,
            )
        };
        if let Some(first) = result.pages_with_date.first() {
            headline.push_str(&format!(" | ex: {first}"));
        }

        let file_names = result.changed_file_names();
        let recipients = if result.recipients.is_empty() {
            "—".to_string()
        } else {
            result.recipients.join(", ")
        };
        let files = if file_names.is_empty() {
            "Nenhum".to_string()
        } else {
            format!("\n- {}", file_names.join("\n- "))
        };

        let summary = vec![
            ("📄 Leiautes verificados".to_string(), join_labels(page_labels)),
            ("📊 Leiautes novos".to_string(), new_layouts.to_string()),
            ("📄 Documentos alterados".to_string(), changed.to_string()),
            ("⚠️ Falhas de verificação".to_string(), result.failures.len().to_string()),
            ("📧 E-mails enviados".to_string(), result.delivered.to_string()),
            ("✉️ Destinatários".to_string(), recipients),
            ("📄 Arquivos com mudanças detectadas".to_string(), files),
        ];

        let recent = result
            .verdicts
            .iter()
            .zip(&file_names)
            .map(|(verdict, name)| format!("{} | {}", name, verdict.evidence_summary()))
            .collect();

        Self {
            code,
            headline,
            extra,
            summary,
            recent,
            log_path: log_path.into(),
        }
    }

    /// Generic failure marker for a run that aborted.
    pub fn failure(error: &dyn fmt::Display, log_path: impl Into<PathBuf>) -> Self {
        let text = error.to_string();
        let reason = text
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or(text.as_str())
            .trim()
            .to_string();

        Self {
            code: StatusCode::Error,
            headline: "Falha na execução".to_string(),
            extra: Some("Veja o log para os detalhes completos.".to_string()),
            summary: vec![("Motivo".to_string(), reason)],
            recent: Vec::new(),
            log_path: log_path.into(),
        }
    }

    /// Render the delimited block stamped with `at`.
    pub fn render(&self, at: DateTime<Local>) -> String {
        let stamp = at.format("%d/%m/%Y %H:%M:%S").to_string();

        let mut lines = vec![
            format!("===== INÍCIO {stamp} ====="),
            format!("{stamp} | {} | {}", self.code, self.headline),
        ];
        if let Some(extra) = &self.extra {
            lines.push(extra.clone());
        }

        lines.push(String::new());
        lines.push("📊 Resumo:".to_string());
        for (key, value) in &self.summary {
            lines.push(format!("- {key}: {value}"));
        }

        if !self.recent.is_empty() {
            lines.push(String::new());
            lines.push("📜 Últimos itens lidos:".to_string());
            for item in self.recent.iter().take(MAX_RECENT_ITEMS) {
                lines.push(format!("- {}", truncate_graphemes(item, MAX_ITEM_CHARS)));
            }
        }

        lines.push(String::new());
        lines.push(format!("ℹ️ Log completo: {}", self.log_path.display()));
        lines.push(format!("===== FIM {stamp} ====="));

        let mut out = lines.join("\n");
        out.push_str("\n\n");
        out
    }

    /// Overwrite the artifact at `path`.
    pub async fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.render(Local::now())).await?;
        log::info!("Status {} written to {}", self.code.label(), path.display());
        Ok(())
    }
}

/// `HH:MM:SS`, hours unbounded.
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn plural(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

/// `a, b e c`
fn join_labels(labels: &[String]) -> String {
    match labels {
        [] => "—".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} e {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{ChangeVerdict, Evidence, ProbeFailure};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn labels() -> Vec<String> {
        vec!["DDR - 2011".into(), "DRM - 2060".into(), "DLO - 2061".into()]
    }

    fn verdict(locator: &str) -> ChangeVerdict {
        ChangeVerdict {
            locator: locator.into(),
            evidence: vec![Evidence::SizeChanged],
            category: "Leiautes".into(),
        }
    }

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 9, 2, 8, 0, 5).unwrap()
    }

    #[test]
    fn test_no_changes_is_ok() {
        let result = RunResult {
            elapsed: Duration::from_secs(5),
            ..Default::default()
        };
        let report = StatusReport::from_run(&result, &labels(), "logs/monitor_20250902.log");

        assert_eq!(report.code, StatusCode::Ok);
        assert_eq!(report.headline, "Nenhuma alteração detectada | em 00:00:05");
        assert!(report.extra.is_none());
    }

    #[test]
    fn test_new_date_is_ok_with_example() {
        let result = RunResult {
            pages_with_date: vec!["DRM - 2060".into()],
            verdicts: vec![
                verdict("https://x/Atual/a.pdf"),
                verdict("https://x/Atual/b.pdf"),
            ],
            elapsed: Duration::from_secs(3725),
            ..Default::default()
        };
        let report = StatusReport::from_run(&result, &labels(), "log");

        assert_eq!(report.code, StatusCode::Ok);
        assert_eq!(
            report.headline,
            "1 leiaute novo, 2 documentos alterados | em 01:02:05 | ex: DRM - 2060"
        );
    }

    #[test]
    fn test_changes_without_date_warn() {
        let result = RunResult {
            verdicts: vec![verdict("https://x/Atual/a.pdf")],
            failures: vec![ProbeFailure {
                locator: "https://x/Atual/b.pdf".into(),
                error: "HEAD/Range fail: timeout".into(),
            }],
            ..Default::default()
        };
        let report = StatusReport::from_run(&result, &labels(), "log");

        assert_eq!(report.code, StatusCode::Warning);
        assert_eq!(report.code.code(), 1);
        assert!(report.headline.starts_with("Link(s) alterado(s), sem data nova"));
        assert!(report.extra.as_deref().unwrap().contains("AVISO TÉCNICO"));
        assert!(
            report
                .summary
                .contains(&("⚠️ Falhas de verificação".to_string(), "1".to_string()))
        );
    }

    #[test]
    fn test_render_layout() {
        let result = RunResult {
            verdicts: vec![verdict("https://x/Atual/Leiaute%20DDR.pdf")],
            recipients: vec!["a@x.com".into(), "b@x.com".into()],
            delivered: 1,
            elapsed: Duration::from_secs(5),
            ..Default::default()
        };
        let text = StatusReport::from_run(&result, &labels(), "logs/monitor_20250902.log")
            .render(at());

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "===== INÍCIO 02/09/2025 08:00:05 =====");
        assert_eq!(
            lines[1],
            "02/09/2025 08:00:05 | 🟡 AVISO | Link(s) alterado(s), sem data nova | em 00:00:05"
        );
        assert!(text.contains("- 📄 Leiautes verificados: DDR - 2011, DRM - 2060 e DLO - 2061"));
        assert!(text.contains("- ✉️ Destinatários: a@x.com, b@x.com"));
        assert!(text.contains("- 📄 Arquivos com mudanças detectadas: \n- Leiaute DDR.pdf"));
        assert!(text.contains("📜 Últimos itens lidos:\n- Leiaute DDR.pdf | content_length mudou"));
        assert!(text.contains("ℹ️ Log completo: logs/monitor_20250902.log"));
        assert!(text.ends_with("===== FIM 02/09/2025 08:00:05 =====\n\n"));
    }

    #[test]
    fn test_recent_items_are_capped() {
        let report = StatusReport {
            code: StatusCode::Ok,
            headline: "h".into(),
            extra: None,
            summary: Vec::new(),
            recent: vec!["x".repeat(200), "b".into(), "c".into(), "d".into()],
            log_path: "log".into(),
        };
        let text = report.render(at());

        assert!(text.contains(&format!("- {}\n", "x".repeat(120))));
        assert!(!text.contains("- d\n"));
    }

    #[test]
    fn test_failure_uses_last_line() {
        let error = AppError::validation("first line\nfinal reason");
        let report = StatusReport::failure(&error, "logs/x.log");
        let text = report.render(at());

        assert_eq!(report.code.code(), 2);
        assert!(text.contains("| 🔴 ERRO | Falha na execução"));
        assert!(text.contains("- Motivo: final reason"));
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("status").join("_status_tail.txt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old content").unwrap();

        let result = RunResult::default();
        StatusReport::from_run(&result, &labels(), "log")
            .write(&path)
            .await
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old content"));
        assert!(text.starts_with("===== INÍCIO "));
    }

    #[test]
    fn test_join_labels() {
        assert_eq!(join_labels(&[]), "—");
        assert_eq!(join_labels(&["A".into()]), "A");
        assert_eq!(join_labels(&["A".into(), "B".into()]), "A e B");
    }
}
