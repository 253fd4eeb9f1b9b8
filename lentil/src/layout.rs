use crate::error::ScreenError;
use serde::{Deserialize, Serialize};

///
/// Column layout of a cell annotation table. Guide indicator columns
/// form one contiguous span, addressed by its first and last column
/// names so the same layout file works across annotation exports with
/// different target panels.
///
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationLayout {
    /// column holding the cell barcode
    pub barcode_column: Box<str>,
    /// column holding the sample identifier; the condition is encoded
    /// as a suffix of this value
    pub sample_column: Box<str>,
    /// first column of the guide indicator span
    pub guide_start_column: Box<str>,
    /// last column of the guide indicator span (inclusive)
    pub guide_end_column: Box<str>,
    /// name of the negative control target within the span
    pub control_label: Box<str>,
    /// cell-level covariate columns carried into the analysis
    pub covariate_columns: Vec<Box<str>>,
    /// fail fast when the discovered span width disagrees
    #[serde(default)]
    pub expected_num_targets: Option<usize>,
}

/// Column positions after resolving a layout against a header line
#[derive(Debug)]
pub struct ResolvedLayout {
    pub barcode: usize,
    pub sample: usize,
    /// inclusive column range of the guide indicators
    pub guide_span: (usize, usize),
    pub covariates: Vec<usize>,
    pub target_names: Vec<Box<str>>,
}

impl AnnotationLayout {
    pub fn from_json_file(json_file: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(json_file)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn to_json_file(&self, json_file: &str) -> anyhow::Result<()> {
        std::fs::write(json_file, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Locate every named column in `header`, taking the target names
    /// from the guide span
    pub fn resolve(&self, header: &[Box<str>], file: &str) -> Result<ResolvedLayout, ScreenError> {
        let find = |column: &str| -> Result<usize, ScreenError> {
            header
                .iter()
                .position(|x| x.as_ref() == column)
                .ok_or_else(|| ScreenError::MissingColumn {
                    column: column.into(),
                    file: file.into(),
                })
        };

        let barcode = find(&self.barcode_column)?;
        let sample = find(&self.sample_column)?;
        let guide_start = find(&self.guide_start_column)?;
        let guide_end = find(&self.guide_end_column)?;

        if guide_end < guide_start {
            return Err(ScreenError::InvariantViolation {
                reason: format!(
                    "guide span '{}'..'{}' is reversed in {}",
                    self.guide_start_column, self.guide_end_column, file
                ),
            });
        }

        let mut covariates = Vec::with_capacity(self.covariate_columns.len());
        for column in self.covariate_columns.iter() {
            covariates.push(find(column)?);
        }

        let target_names: Vec<Box<str>> = header[guide_start..=guide_end].to_vec();

        if let Some(expected) = self.expected_num_targets {
            if expected != target_names.len() {
                return Err(ScreenError::InvariantViolation {
                    reason: format!(
                        "expected {} targets, found {} between '{}' and '{}'",
                        expected,
                        target_names.len(),
                        self.guide_start_column,
                        self.guide_end_column
                    ),
                });
            }
        }

        Ok(ResolvedLayout {
            barcode,
            sample,
            guide_span: (guide_start, guide_end),
            covariates,
            target_names,
        })
    }
}
