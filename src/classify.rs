//! Response classification: raw response text to `(Severity, message)`.

use crate::config::OutputType;
use crate::error::{ChainError, Result};
use crate::operation::Operation;
use crate::severity::Severity;
use crate::xml::tree::{self, Element};
use regex::Regex;

/// Outcome of classifying one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub message: String,
}

impl Classification {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.severity.is_success()
    }
}

/// Per-operation rendering and failure rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseProfile {
    pub output_type: OutputType,
    /// Pattern that escalates a response to FATAL when found in its text.
    pub fail_state: Option<String>,
    /// Keep only lines matching this pattern.
    pub filter: Option<String>,
    /// Drop lines matching this pattern.
    pub filter_out: Option<String>,
}

impl ResponseProfile {
    pub fn for_operation(op: &Operation, output_type: OutputType) -> Self {
        Self {
            output_type,
            fail_state: op.fail_state.clone(),
            filter: op.filter.clone(),
            filter_out: op.filter_out.clone(),
        }
    }
}

pub trait ResponseClassifier: Send + Sync {
    /// Classify `raw`. Unparseable input is a
    /// [`ChainError::Classification`].
    fn classify(&self, raw: &str, profile: &ResponseProfile) -> Result<Classification>;
}

/// Classifier for SOMA and AMP SOAP responses.
///
/// - `HttpErrorResponse` documents and SOAP faults are FATAL.
/// - SOMA `dp:result` is INFO when it reads `OK`, FATAL otherwise.
/// - AMP `Status` is INFO when it reads `ok`, FATAL otherwise.
/// - Any other response body is INFO, rendered per the output type.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlResponseClassifier;

fn classification_error(message: impl Into<String>) -> ChainError {
    ChainError::Classification {
        operation: String::new(),
        message: message.into(),
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| classification_error(format!("invalid pattern '{}': {}", pattern, e)))
}

/// One line per object: `Object key=value key=value`.
fn render_parsed(content: &Element) -> String {
    let mut lines = Vec::new();
    for object in content.child_elements() {
        if object.is_leaf() {
            lines.push(format!("{}={}", object.local_name(), object.text().trim()));
            continue;
        }
        let mut line = object.local_name().to_string();
        for field in object.child_elements() {
            line.push(' ');
            line.push_str(field.local_name());
            line.push('=');
            line.push_str(field.text().trim());
        }
        lines.push(line);
    }
    if lines.is_empty() {
        content.text().trim().to_string()
    } else {
        lines.join("\n")
    }
}

/// One `name=value` line per leaf.
fn render_lines(content: &Element) -> String {
    let leaves: Vec<String> = content
        .descendants()
        .into_iter()
        .filter(|e| e.is_leaf())
        .map(|e| format!("{}={}", e.local_name(), e.text().trim()))
        .collect();
    if leaves.is_empty() {
        content.text().trim().to_string()
    } else {
        leaves.join("\n")
    }
}

fn render(content: &Element, raw: &str, output: OutputType) -> String {
    match output {
        OutputType::Parsed => render_parsed(content),
        OutputType::Lines => render_lines(content),
        OutputType::Xml => raw.to_string(),
    }
}

impl XmlResponseClassifier {
    fn judge(&self, root: &Element, raw: &str, output: OutputType) -> Result<Classification> {
        if root.local_name() == "HttpErrorResponse" {
            return Ok(Classification::new(Severity::Fatal, render_parsed(root)));
        }

        let body = root
            .find("Body")
            .ok_or_else(|| classification_error("response has no SOAP body"))?;

        if let Some(fault) = body.find("Fault") {
            let message = fault
                .find("faultstring")
                .map(|f| f.text().trim().to_string())
                .unwrap_or_else(|| fault.text().trim().to_string());
            return Ok(Classification::new(Severity::Fatal, message));
        }

        let content = body
            .child_elements()
            .next()
            .ok_or_else(|| classification_error("SOAP body is empty"))?;

        // SOMA: dp:response wrapping a result, status, config or file.
        if content.local_name() == "response" {
            if let Some(result) = content.child("result") {
                let text = result.text().trim().to_string();
                return Ok(if text.eq_ignore_ascii_case("OK") {
                    Classification::new(Severity::Info, "OK")
                } else {
                    let message = if text.is_empty() {
                        render(result, raw, output)
                    } else {
                        text
                    };
                    Classification::new(Severity::Fatal, message)
                });
            }
            if let Some(file) = content.child("file") {
                return Ok(Classification::new(Severity::Info, file.text().trim()));
            }
            let payload = content
                .child_elements()
                .find(|e| e.local_name() != "timestamp")
                .unwrap_or(content);
            return Ok(Classification::new(Severity::Info, render(payload, raw, output)));
        }

        // AMP: a single *Response element, optionally carrying a Status.
        if let Some(status) = content.child("Status") {
            let text = status.text().trim().to_string();
            return Ok(if text.eq_ignore_ascii_case("ok") {
                Classification::new(Severity::Info, "ok")
            } else {
                Classification::new(Severity::Fatal, render(content, raw, output))
            });
        }
        Ok(Classification::new(Severity::Info, render(content, raw, output)))
    }
}

impl ResponseClassifier for XmlResponseClassifier {
    fn classify(&self, raw: &str, profile: &ResponseProfile) -> Result<Classification> {
        if raw.trim().is_empty() {
            return Err(classification_error("empty response"));
        }
        let root = tree::parse(raw).map_err(|e| classification_error(e.to_string()))?;
        let mut classification = self.judge(&root, raw, profile.output_type)?;

        if let Some(pattern) = &profile.fail_state {
            if compile(pattern)?.is_match(&classification.message) {
                classification.severity = Severity::Fatal;
            }
        }

        if profile.output_type != OutputType::Xml
            && (profile.filter.is_some() || profile.filter_out.is_some())
        {
            let keep = profile.filter.as_deref().map(compile).transpose()?;
            let drop = profile.filter_out.as_deref().map(compile).transpose()?;
            classification.message = classification
                .message
                .lines()
                .filter(|l| keep.as_ref().map_or(true, |re| re.is_match(l)))
                .filter(|l| drop.as_ref().map_or(true, |re| !re.is_match(l)))
                .collect::<Vec<_>>()
                .join("\n");
        }

        Ok(classification)
    }
}

/// Surrogate response for a transport failure, so it can be classified like
/// any other response.
pub fn http_error_response(error: &ChainError) -> String {
    let status = match error {
        ChainError::Transport {
            status: Some(code), ..
        } => code.to_string(),
        _ => String::new(),
    };
    let mut root = Element::new("HttpErrorResponse");
    if !status.is_empty() {
        let mut s = Element::new("status");
        s.set_text(status);
        root.push(s);
    }
    let mut message = Element::new("message");
    message.set_text(error.to_string());
    root.push(message);
    root.to_xml()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soma(inner: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"><env:Body><dp:response xmlns:dp="http://www.datapower.com/schemas/management"><dp:timestamp>2024-01-01T00:00:00</dp:timestamp>{}</dp:response></env:Body></env:Envelope>"#,
            inner
        )
    }

    fn classify(raw: &str, profile: &ResponseProfile) -> Result<Classification> {
        XmlResponseClassifier.classify(raw, profile)
    }

    const STATUS: &str = "<dp:status>\
<ObjectStatus><Class>XMLFirewallService</Class><OpState>up</OpState><AdminState>enabled</AdminState><Name>fw-a</Name></ObjectStatus>\
<ObjectStatus><Class>XMLFirewallService</Class><OpState>down</OpState><AdminState>enabled</AdminState><Name>fw-b</Name></ObjectStatus>\
</dp:status>";

    #[test]
    fn test_soma_result_ok_is_info() {
        let c = classify(&soma("<dp:result> OK </dp:result>"), &Default::default()).unwrap();
        assert_eq!(c, Classification::new(Severity::Info, "OK"));
    }

    #[test]
    fn test_soma_result_error_is_fatal() {
        let c = classify(
            &soma("<dp:result><error-log><log-event>Import failed</log-event></error-log></dp:result>"),
            &Default::default(),
        )
        .unwrap();
        assert_eq!(c.severity, Severity::Fatal);
        assert!(c.message.contains("Import failed"));
    }

    #[test]
    fn test_status_rendering_and_filter_out() {
        let c = classify(&soma(STATUS), &Default::default()).unwrap();
        assert_eq!(c.severity, Severity::Info);
        assert_eq!(c.message.lines().count(), 2);
        assert!(c
            .message
            .starts_with("ObjectStatus Class=XMLFirewallService OpState=up AdminState=enabled"));

        let profile = ResponseProfile {
            filter_out: Some(crate::operation::EXPECTED_STATUS.to_string()),
            ..Default::default()
        };
        let c = classify(&soma(STATUS), &profile).unwrap();
        assert_eq!(c.message.lines().count(), 1);
        assert!(c.message.contains("fw-b"));
    }

    #[test]
    fn test_fail_state_escalates() {
        let profile = ResponseProfile {
            fail_state: Some("OpState=down".into()),
            ..Default::default()
        };
        let c = classify(&soma(STATUS), &profile).unwrap();
        assert_eq!(c.severity, Severity::Fatal);
    }

    #[test]
    fn test_lines_output() {
        let profile = ResponseProfile {
            output_type: OutputType::Lines,
            filter: Some("^Name=".into()),
            ..Default::default()
        };
        let c = classify(&soma(STATUS), &profile).unwrap();
        assert_eq!(c.message, "Name=fw-a\nName=fw-b");
    }

    #[test]
    fn test_fault_is_fatal() {
        let raw = r#"<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"><env:Body><env:Fault><faultcode>env:Client</faultcode><faultstring>Internal Error (from client)</faultstring></env:Fault></env:Body></env:Envelope>"#;
        let c = classify(raw, &Default::default()).unwrap();
        assert_eq!(c, Classification::new(Severity::Fatal, "Internal Error (from client)"));
    }

    #[test]
    fn test_amp_status() {
        let ok = r#"<env:Envelope xmlns:env="http://schemas.xmlsoap.org/soap/envelope/"><env:Body><amp:SetFirmwareResponse xmlns:amp="x"><amp:Status>ok</amp:Status></amp:SetFirmwareResponse></env:Body></env:Envelope>"#;
        assert_eq!(classify(ok, &Default::default()).unwrap().severity, Severity::Info);
        let bad = ok.replace(">ok<", ">error<");
        assert_eq!(classify(&bad, &Default::default()).unwrap().severity, Severity::Fatal);
    }

    #[test]
    fn test_http_error_surrogate_is_fatal() {
        let err = ChainError::Transport {
            status: Some(401),
            message: "Unauthorized".into(),
        };
        let raw = http_error_response(&err);
        let c = classify(&raw, &Default::default()).unwrap();
        assert_eq!(c.severity, Severity::Fatal);
        assert!(c.message.contains("status=401"));
    }

    #[test]
    fn test_unparseable_is_classification_error() {
        let err = classify("this is not <xml", &Default::default()).unwrap_err();
        assert!(matches!(err, ChainError::Classification { .. }));
        let err = classify("", &Default::default()).unwrap_err();
        assert!(matches!(err, ChainError::Classification { .. }));
        let err = classify("<a><b/></a>", &Default::default()).unwrap_err();
        assert!(matches!(err, ChainError::Classification { .. }));
    }

    #[test]
    fn test_xml_output_keeps_raw() {
        let raw = soma(STATUS);
        let profile = ResponseProfile {
            output_type: OutputType::Xml,
            filter_out: Some("fw-a".into()),
            ..Default::default()
        };
        let c = classify(&raw, &profile).unwrap();
        assert_eq!(c.message, raw);
    }
}
