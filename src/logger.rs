use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use tracing::warn;

use crate::pacer::Rate;
use crate::stats::RunStats;
use crate::transport::{PreparedRequest, RawResponse};

const LOGO: &str = r"
                 _       _ __                        ____
    ____  _____(_)   __(_) /__  ____ ____     ____/ __/_  __________  ___  _____
   / __ \/ ___/ / | / / / / _ \/ __ `/ _ \   / __/ /_/ / / /_  /_  / / _ \/ ___/
  / /_/ / /  / /| |/ / / /  __/ /_/ /  __/  / /_/ __/ /_/ / / /_/ /_/  __/ /
 / .___/_/  /_/ |___/_/_/\___/\__, /\___/   \__/_/  \__,_/ /___/___/\___/_/
/_/                          /____/
";

/// Run information printed under the banner.
#[derive(Debug, Default)]
pub struct RunInfo<'a> {
    pub base_uri: &'a str,
    pub endpoints: usize,
    pub definition: Option<&'a Path>,
    pub cert: Option<&'a Path>,
    pub log: Option<&'a Path>,
    pub proxy: Option<&'a str>,
    pub rate: Option<Rate>,
    pub variables: usize,
    pub tests: String,
}

/// Writes the run report to stdout, teeing into a log file when one is open.
pub struct Logger {
    out: Box<dyn Write>,
    file: Option<File>,
    debug: bool,
}

impl Logger {
    pub fn new(debug: bool, log_file: Option<&Path>) -> Logger {
        let mut logger = Logger::with_writer(Box::new(io::stdout()), debug);
        if let Some(path) = log_file {
            match OpenOptions::new().append(true).create(true).open(path) {
                Ok(file) => logger.file = Some(file),
                Err(err) => {
                    warn!(%err, path = %path.display(), "unable to open log file");
                    logger.error("Could not open logfile, continuing without writing to file");
                }
            }
        }
        logger
    }

    pub fn with_writer(out: Box<dyn Write>, debug: bool) -> Logger {
        Logger {
            out,
            file: None,
            debug,
        }
    }

    fn write(&mut self, message: &str) {
        // A broken stdout or log file must not abort the run.
        let _ = self.out.write_all(message.as_bytes());
        let _ = self.out.flush();
        if let Some(file) = self.file.as_mut() {
            let _ = file.write_all(message.as_bytes());
        }
    }

    fn writeln(&mut self, message: &str) {
        self.write(message);
        self.write("\n");
    }

    pub fn banner(&mut self) {
        self.writeln(LOGO);
    }

    pub fn run_info(&mut self, info: &RunInfo) {
        self.writeln(&format!("API: {}", info.base_uri));
        self.writeln(&format!("Endpoints: {}", info.endpoints));
        self.writeln(&format!("Variables: {}", info.variables));
        self.writeln("");
        if let Some(cert) = info.cert {
            self.writeln(&format!("Cert: {}", cert.display()));
        }
        if let Some(definition) = info.definition {
            self.writeln(&format!("Definition: {}", definition.display()));
        }
        if let Some(log) = info.log {
            self.writeln(&format!("Log: {}", log.display()));
        }
        if let Some(proxy) = info.proxy {
            self.writeln(&format!("Proxy: {}", proxy));
        }
        if let Some(rate) = info.rate {
            self.writeln(&format!("Rate: {}", rate));
        }
        self.writeln(&format!("Tests: {}", info.tests));
        if self.debug {
            self.writeln("Debugging: on");
        }
        self.writeln("");
    }

    pub fn starting(&mut self) {
        self.writeln("Starting...");
        self.writeln("");
    }

    pub fn test_prefix(&mut self, request_id: u64, endpoint: &str, test_name: &str) {
        let prefix = format!("[{}][{}][{}] ", request_id, endpoint, test_name);
        if self.debug {
            self.writeln(&prefix);
            self.writeln("");
        } else {
            self.write(&prefix);
        }
    }

    pub fn test_result(&mut self, result: &str) {
        self.writeln(result);
        if self.debug {
            self.writeln("");
        }
    }

    pub fn message(&mut self, message: &str) {
        self.writeln(message);
    }

    pub fn error(&mut self, message: &str) {
        self.writeln(&format!("Error: {}", message));
    }

    pub fn fatal(&mut self, message: &str) {
        self.writeln("");
        self.writeln(&format!("Fatal: {}", message));
        self.writeln("Exiting");
        self.writeln("");
    }

    pub fn dump_request(&mut self, request: &PreparedRequest) {
        if self.debug {
            self.writeln(&request.dump());
        }
    }

    pub fn dump_response(&mut self, response: &RawResponse) {
        if self.debug {
            self.writeln(&response.dump());
            self.writeln("");
        }
    }

    pub fn finding(&mut self, request: &PreparedRequest) {
        self.writeln(&format!("    reproduce: {}", request.to_curl()));
    }

    pub fn summary(&mut self, stats: &RunStats) {
        self.writeln("");
        for line in stats.report() {
            self.writeln(&line);
        }
        self.writeln("");
        self.writeln("Done, nice one");
        self.writeln("");
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// In-memory sink shared between a logger and the test reading it.
    #[derive(Clone, Default)]
    pub struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Captured {
        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prefix_and_result_share_a_line() {
        let captured = Captured::default();
        let mut logger = Logger::with_writer(Box::new(captured.clone()), false);
        logger.test_prefix(3, "GET /users/$id", "hp");
        logger.test_result("200 OK");
        assert_eq!(captured.text(), "[3][GET /users/$id][hp] 200 OK\n");
    }

    #[test]
    fn dumps_only_in_debug_mode() {
        let request = PreparedRequest {
            method: "GET".to_string(),
            uri: "http://h/a".to_string(),
            headers: vec![],
            body: vec![],
        };

        let quiet = Captured::default();
        Logger::with_writer(Box::new(quiet.clone()), false).dump_request(&request);
        assert!(quiet.text().is_empty());

        let loud = Captured::default();
        Logger::with_writer(Box::new(loud.clone()), true).dump_request(&request);
        assert!(loud.text().contains("GET http://h/a"));
    }

    #[test]
    fn tees_into_log_file() {
        let path = std::env::temp_dir().join(format!("privilege-fuzzer-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let mut logger = Logger::new(false, Some(&path));
            logger.error("boom");
        }
        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written, "Error: boom\n");
    }
}
