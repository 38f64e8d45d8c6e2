use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

// ── Result types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Serialize)]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    pub duration_ms: u64,
    /// Device memory allocated while the case ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_memory_bytes: Option<u64>,
}

impl CaseResult {
    fn new(name: &str, status: CaseStatus, message: &str) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.to_string(),
            details: Vec::new(),
            duration_ms: 0,
            device_memory_bytes: None,
        }
    }

    pub fn pass(name: &str, message: &str) -> Self {
        Self::new(name, CaseStatus::Pass, message)
    }

    pub fn fail(name: &str, message: &str) -> Self {
        Self::new(name, CaseStatus::Fail, message)
    }

    pub fn skip(name: &str, message: &str) -> Self {
        Self::new(name, CaseStatus::Skip, message)
    }

    pub fn detail(mut self, detail: &str) -> Self {
        self.details.push(detail.to_string());
        self
    }

    pub fn files(mut self, paths: &[PathBuf]) -> Self {
        for path in paths {
            self.details.push(format!("wrote {}", path.display()));
        }
        self
    }

    pub fn took(mut self, elapsed: Duration) -> Self {
        self.duration_ms = elapsed.as_millis() as u64;
        self
    }

    pub fn memory(mut self, bytes: u64) -> Self {
        self.device_memory_bytes = Some(bytes);
        self
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
}

pub fn summarize(results: &[CaseResult]) -> Summary {
    let mut summary = Summary::default();
    for result in results {
        match result.status {
            CaseStatus::Pass => summary.passed += 1,
            CaseStatus::Fail => summary.failed += 1,
            CaseStatus::Skip => summary.skipped += 1,
        }
    }
    summary
}

pub fn has_failures(results: &[CaseResult]) -> bool {
    results.iter().any(|r| r.status == CaseStatus::Fail)
}

// ── Output formatters ───────────────────────────────────────────────────────

pub fn print_pretty(device: Option<&str>, results: &[CaseResult]) {
    println!();
    println!("VKT Case Results");
    println!("================");
    if let Some(device) = device {
        println!("  device: {}", device);
    }
    println!();

    for result in results {
        let (icon, color_start, color_end) = match result.status {
            CaseStatus::Pass => ("[PASS]", "\x1b[32m", "\x1b[0m"),
            CaseStatus::Fail => ("[FAIL]", "\x1b[31m", "\x1b[0m"),
            CaseStatus::Skip => ("[SKIP]", "\x1b[90m", "\x1b[0m"),
        };

        println!(
            "  {}{}{} {} - {} ({} ms)",
            color_start, icon, color_end, result.name, result.message, result.duration_ms
        );
        if let Some(bytes) = result.device_memory_bytes {
            println!("         {} KiB of device memory", bytes.div_ceil(1024));
        }
        for detail in &result.details {
            println!("         {}", detail);
        }
        println!();
    }

    let summary = summarize(results);
    println!("-------------------------------");
    println!(
        "  {} passed, {} failed, {} skipped",
        summary.passed, summary.failed, summary.skipped
    );
    println!();
}

pub fn to_json(device: Option<&str>, results: &[CaseResult]) -> serde_json::Result<String> {
    let report = serde_json::json!({
        "device": device,
        "results": results,
    });
    serde_json::to_string_pretty(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<CaseResult> {
        vec![
            CaseResult::pass("msaa", "rendered 1 image")
                .files(&[PathBuf::from("out/rt.ppm")])
                .memory(1_441_792),
            CaseResult::skip("tex", "format unsupported"),
            CaseResult::fail("push_const", "device lost").took(Duration::from_millis(12)),
        ]
    }

    #[test]
    fn summary_counts_each_status() {
        let results = sample();
        assert_eq!(
            summarize(&results),
            Summary {
                passed: 1,
                failed: 1,
                skipped: 1
            }
        );
        assert!(has_failures(&results));
        assert!(!has_failures(&results[..2]));
    }

    #[test]
    fn json_uses_lowercase_status_and_omits_empty_details() {
        let json = to_json(Some("llvmpipe"), &sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["device"], "llvmpipe");

        let results = value["results"].as_array().unwrap();
        assert_eq!(results[0]["status"], "pass");
        assert_eq!(results[0]["details"][0], "wrote out/rt.ppm");
        assert_eq!(results[1]["status"], "skip");
        assert!(results[1].get("details").is_none());
        assert_eq!(results[2]["duration_ms"], 12);
        assert_eq!(results[0]["device_memory_bytes"], 1_441_792);
        assert!(results[2].get("device_memory_bytes").is_none());
    }

    #[test]
    fn json_without_device_is_null() {
        let json = to_json(None, &[]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["device"].is_null());
        assert_eq!(value["results"].as_array().map(Vec::len), Some(0));
    }
}
