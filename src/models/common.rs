use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Pdf,
    Excel,
    Csv,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Pdf => write!(f, "pdf"),
            OutputFormat::Excel => write!(f, "excel"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(OutputFormat::Pdf),
            "excel" => Ok(OutputFormat::Excel),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,   // < 1 min
    Normal, // < 5 min
    Low,    // Best effort
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Invoice,
    Report,
    Certificate,
    Statement,
    Receipt,
    Custom(String),
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentType::Invoice => write!(f, "invoice"),
            DocumentType::Report => write!(f, "report"),
            DocumentType::Certificate => write!(f, "certificate"),
            DocumentType::Statement => write!(f, "statement"),
            DocumentType::Receipt => write!(f, "receipt"),
            DocumentType::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for DocumentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "invoice" => DocumentType::Invoice,
            "report" => DocumentType::Report,
            "certificate" => DocumentType::Certificate,
            "statement" => DocumentType::Statement,
            "receipt" => DocumentType::Receipt,
            other => DocumentType::Custom(other.to_string()),
        })
    }
}
