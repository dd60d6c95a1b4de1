use serde::{Deserialize, Serialize};

pub const UNKNOWN_DIAGNOSIS: &str = "Unable to determine diagnosis";
pub const UNKNOWN_CAUSES: &str = "Unable to determine causes";
pub const UNKNOWN_REMEDIES: &str = "Unable to determine remedies";

/// The three finding lists recovered from a model reply, before sentinels are applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub possible_diagnosis: Vec<String>,
    pub causes: Vec<String>,
    pub remedies_or_cure: Vec<String>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.possible_diagnosis.is_empty() && self.causes.is_empty() && self.remedies_or_cure.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    pub success: bool,
    #[serde(default)]
    pub possible_diagnosis: Vec<String>,
    #[serde(default)]
    pub causes: Vec<String>,
    #[serde(default)]
    pub remedies_or_cure: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

impl DiagnosisResult {
    /// Fills any empty list with its sentinel. `raw_text` is kept whenever a sentinel was needed.
    pub fn from_findings(findings: Findings, raw: &str) -> Self {
        let mut degraded = false;
        let mut or_sentinel = |items: Vec<String>, sentinel: &str| {
            if items.is_empty() {
                degraded = true;
                vec![sentinel.to_string()]
            } else {
                items
            }
        };

        let possible_diagnosis = or_sentinel(findings.possible_diagnosis, UNKNOWN_DIAGNOSIS);
        let causes = or_sentinel(findings.causes, UNKNOWN_CAUSES);
        let remedies_or_cure = or_sentinel(findings.remedies_or_cure, UNKNOWN_REMEDIES);

        Self {
            success: true,
            possible_diagnosis,
            causes,
            remedies_or_cure,
            raw_text: degraded.then(|| raw.to_string()),
            error: None,
            image_path: None,
        }
    }

    pub fn unable_to_determine(raw: &str) -> Self {
        Self::from_findings(Findings::default(), raw)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            possible_diagnosis: Vec::new(),
            causes: Vec::new(),
            remedies_or_cure: Vec::new(),
            raw_text: None,
            error: Some(error.into()),
            image_path: None,
        }
    }

    pub fn with_image_path(mut self, image_path: impl Into<String>) -> Self {
        self.image_path = Some(image_path.into());
        self
    }

    /// True when nothing structured was recovered and every list is a sentinel.
    pub fn is_undetermined(&self) -> bool {
        self.possible_diagnosis == [UNKNOWN_DIAGNOSIS]
            && self.causes == [UNKNOWN_CAUSES]
            && self.remedies_or_cure == [UNKNOWN_REMEDIES]
    }

    /// Markdown for the chat UI. Falls back to the raw reply when nothing was recovered.
    pub fn format_for_ui(&self) -> String {
        if self.is_undetermined() {
            if let Some(raw) = &self.raw_text {
                return raw.clone();
            }
        }

        let mut out = String::from("**Plant Disease Analysis**\n\n");
        let sections = [
            ("Possible Diagnosis", &self.possible_diagnosis),
            ("Causes", &self.causes),
            ("Remedies", &self.remedies_or_cure),
        ];
        for (title, items) in sections {
            out.push_str(&format!("**{}:**\n", title));
            for item in items {
                out.push_str(&format!("- {}\n", item));
            }
            out.push('\n');
        }
        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    }
}
