#[cfg(test)]
#[path = "execution_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;
use serde_json::Map;
use serde_json::Value;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Logs {
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
}

impl Logs {
    pub fn is_empty(&self) -> bool {
        return self.stdout.is_empty() && self.stderr.is_empty();
    }
}

/// One rich output of an execution. The sandbox may attach any number of
/// representations (text, html, svg, ...); only `png` is read by graphgen, the
/// rest is kept as is for inspection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub png: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub traceback: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub logs: Logs,
    pub results: Vec<ResultItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    /// The base64 image of the first result, the only image that gets persisted.
    pub fn first_image(&self) -> Option<&str> {
        return self
            .results
            .first()
            .and_then(|item| return item.png.as_deref())
            .filter(|png| return !png.is_empty());
    }
}
