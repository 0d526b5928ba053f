// Run request resolution from annotated documents
//
// A document can carry:
//   @sfccJobTailLogTimeout <ms>
//   @sfccJobClearLog
//   @sfccJobId <job id>
// Scanning stops at the first line naming a job id.

use crate::models::RunRequest;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref TIMEOUT_ANNOTATION: Regex =
        Regex::new(r"\s*@sfccJobTailLogTimeout\s(\S+)").expect("valid timeout pattern");
    static ref CLEAR_LOG_ANNOTATION: Regex =
        Regex::new(r"\s*@sfccJobClearLog").expect("valid clear-log pattern");
    static ref JOB_ID_ANNOTATION: Regex =
        Regex::new(r"\s*@sfccJobId\s(\S+)").expect("valid job id pattern");
}

impl RunRequest {
    /// Build a run request from the annotations found in `document`.
    ///
    /// The job id is empty when the document names none.
    pub fn from_document(document: &str) -> Self {
        let mut request = RunRequest::default();
        request.apply_document(document);
        request
    }

    /// Overlay the annotations of `document` on this request
    pub fn apply_document(&mut self, document: &str) {
        for line in document.lines() {
            if let Some(captures) = TIMEOUT_ANNOTATION.captures(line) {
                match parse_leading_number(&captures[1]) {
                    Some(timeout) => self.timeout_millis = timeout,
                    None => debug!(value = &captures[1], "Ignoring unparsable tail timeout"),
                }
            }

            if CLEAR_LOG_ANNOTATION.is_match(line) {
                self.clear_output_first = true;
            }

            if let Some(captures) = JOB_ID_ANNOTATION.captures(line) {
                self.job_id = captures[1].to_string();
                break;
            }
        }
    }
}

/// Parse the leading decimal digits of `value` ("5000ms" reads as 5000)
fn parse_leading_number(value: &str) -> Option<u64> {
    let digits: String = value.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}
