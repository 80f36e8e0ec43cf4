use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One test strategy that can be switched on from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TestCode {
    HighPrivileged,
    LowPrivilegedPermutations,
    NoPrivilege,
    RequestParamPollution,
    BodyParamPollution,
    MethodReplacement,
    RequestParamWrap,
    BodyParamWrap,
    RequestParamSubstitution,
    RequestParamSubstitutionPollution,
    JsonSuffix,
    All,
}

impl TestCode {
    pub fn code(&self) -> &'static str {
        match self {
            TestCode::HighPrivileged => "hp",
            TestCode::LowPrivilegedPermutations => "lp",
            TestCode::NoPrivilege => "np",
            TestCode::RequestParamPollution => "rpp",
            TestCode::BodyParamPollution => "bpp",
            TestCode::MethodReplacement => "mr",
            TestCode::RequestParamWrap => "rpw",
            TestCode::BodyParamWrap => "bpw",
            TestCode::RequestParamSubstitution => "rps",
            TestCode::RequestParamSubstitutionPollution => "rpspp",
            TestCode::JsonSuffix => "json",
            TestCode::All => "all",
        }
    }
}

impl FromStr for TestCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s.trim().to_ascii_lowercase().as_str() {
            "hp" => TestCode::HighPrivileged,
            "lp" => TestCode::LowPrivilegedPermutations,
            "np" => TestCode::NoPrivilege,
            "rpp" => TestCode::RequestParamPollution,
            "bpp" => TestCode::BodyParamPollution,
            "mr" => TestCode::MethodReplacement,
            "rpw" => TestCode::RequestParamWrap,
            "bpw" => TestCode::BodyParamWrap,
            "rps" => TestCode::RequestParamSubstitution,
            "rpspp" => TestCode::RequestParamSubstitutionPollution,
            "json" => TestCode::JsonSuffix,
            "all" => TestCode::All,
            _ => return Err(s.trim().to_string()),
        };
        Ok(code)
    }
}

impl fmt::Display for TestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The set of enabled strategies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCodes(BTreeSet<TestCode>);

impl TestCodes {
    /// Parses a comma-separated list. Unknown codes are returned next to the
    /// recognised ones so they can be reported and left out of the run.
    pub fn parse(list: &str) -> (TestCodes, Vec<String>) {
        let mut codes = BTreeSet::new();
        let mut unrecognised = Vec::new();
        for item in list.split(',').filter(|item| !item.trim().is_empty()) {
            match item.parse::<TestCode>() {
                Ok(code) => {
                    codes.insert(code);
                }
                Err(raw) => unrecognised.push(raw),
            }
        }
        (TestCodes(codes), unrecognised)
    }

    pub fn contains(&self, code: TestCode) -> bool {
        self.0.contains(&TestCode::All) || self.0.contains(&code)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TestCodes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let codes: Vec<&str> = self.0.iter().map(TestCode::code).collect();
        f.write_str(&codes.join(","))
    }
}
