use std::fmt;

/// What a test case expects from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Success,
    /// A 4xx, with none of the banned words in the body.
    Denied { banned: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Ok,
    UnexpectedStatus,
    LeakInProbableError,
    Leak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub status: u16,
    pub classification: Classification,
    pub expectation_met: bool,
    expected_success: bool,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Only a leak outside an error message counts as a finding.
    pub fn is_finding(&self) -> bool {
        self.classification == Classification::Leak
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match (self.expected_success, self.expectation_met, self.classification) {
            (true, _, Classification::Ok) => "OK",
            (true, _, _) => "Unexpected status code, expecting 2xx",
            (false, false, Classification::Leak) => {
                "Unexpected status code and high privileged data found in response"
            }
            (false, false, Classification::LeakInProbableError) => {
                "OK (unexpected status code and high privileged data found in probable error message)"
            }
            (false, false, _) => "OK (unexpected status code)",
            (false, true, Classification::Leak) => "High privileged data found in response",
            (false, true, Classification::LeakInProbableError) => {
                "OK (high privileged data found in probable error message)"
            }
            (false, true, _) => "OK",
        };
        write!(f, "{} {}", self.status, message)
    }
}

pub fn verify(status: u16, body: &[u8], expectation: &Expectation) -> Verdict {
    match expectation {
        Expectation::Success => verify_expected_ok(status),
        Expectation::Denied { banned } => verify_expected_unauthorised(status, body, banned),
    }
}

pub fn verify_expected_ok(status: u16) -> Verdict {
    let ok = (200..300).contains(&status);
    Verdict {
        status,
        classification: if ok {
            Classification::Ok
        } else {
            Classification::UnexpectedStatus
        },
        expectation_met: ok,
        expected_success: true,
    }
}

pub fn verify_expected_unauthorised(status: u16, body: &[u8], banned: &[String]) -> Verdict {
    let denied = (400..500).contains(&status);
    let classification = match scan_for_banned_words(body, banned) {
        BannedWords::Found => Classification::Leak,
        BannedWords::FoundInError => Classification::LeakInProbableError,
        BannedWords::NotFound => Classification::Ok,
    };
    Verdict {
        status,
        classification,
        expectation_met: denied,
        expected_success: false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum BannedWords {
    Found,
    FoundInError,
    NotFound,
}

fn scan_for_banned_words(body: &[u8], banned: &[String]) -> BannedWords {
    let body = String::from_utf8_lossy(body).to_lowercase();
    let leaked = banned
        .iter()
        .filter(|word| !word.is_empty())
        .any(|word| body.contains(&word.to_lowercase()));

    match (leaked, body.contains("error")) {
        (false, _) => BannedWords::NotFound,
        (true, true) => BannedWords::FoundInError,
        (true, false) => BannedWords::Found,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banned(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn expects_2xx() {
        assert_eq!(verify_expected_ok(204).classification, Classification::Ok);
        let verdict = verify_expected_ok(403);
        assert_eq!(verdict.classification, Classification::UnexpectedStatus);
        assert_eq!(verdict.to_string(), "403 Unexpected status code, expecting 2xx");
    }

    #[test]
    fn leak_in_success_response() {
        let verdict = verify_expected_unauthorised(200, br#"{"token":"SECRET42"}"#, &banned(&["secret42"]));
        assert_eq!(verdict.classification, Classification::Leak);
        assert!(verdict.is_finding());
        assert_eq!(
            verdict.to_string(),
            "200 Unexpected status code and high privileged data found in response"
        );
    }

    #[test]
    fn classification_matrix() {
        let words = banned(&["secret42"]);
        let cases: [(u16, &[u8], Classification); 6] = [
            (200, b"error: secret42", Classification::LeakInProbableError),
            (200, b"secret42", Classification::Leak),
            (200, b"nothing", Classification::Ok),
            (403, b"Error: secret42 denied", Classification::LeakInProbableError),
            (403, b"secret42", Classification::Leak),
            (403, b"forbidden", Classification::Ok),
        ];
        for (status, body, expected) in cases {
            let verdict = verify_expected_unauthorised(status, body, &words);
            assert_eq!(verdict.status, status);
            assert_eq!(verdict.classification, expected, "{} {:?}", status, body);
        }
    }

    #[test]
    fn messages_for_denied_expectation() {
        let words = banned(&["x1"]);
        assert_eq!(verify_expected_unauthorised(404, b"", &words).to_string(), "404 OK");
        assert_eq!(
            verify_expected_unauthorised(500, b"", &words).to_string(),
            "500 OK (unexpected status code)"
        );
        assert_eq!(
            verify_expected_unauthorised(401, b"x1", &words).to_string(),
            "401 High privileged data found in response"
        );
    }

    #[test]
    fn empty_banned_words_never_match() {
        let verdict = verify_expected_unauthorised(200, b"anything", &banned(&[""]));
        assert_eq!(verdict.classification, Classification::Ok);
        assert!(!verdict.expectation_met);
    }
}
