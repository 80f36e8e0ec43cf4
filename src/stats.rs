use std::time::Duration;

/// Response times of one run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Latency {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl Latency {
    fn of(samples: &[Duration]) -> Option<Latency> {
        let first = samples.first()?.as_secs_f64() * 1000.;
        let millis = samples.iter().map(|sample| sample.as_secs_f64() * 1000.);
        let count = samples.len() as f64;

        let (min, max, sum) = millis
            .clone()
            .fold((first, first, 0.), |(min, max, sum), ms| (min.min(ms), max.max(ms), sum + ms));
        let mean = sum / count;
        let spread = millis.map(|ms| (ms - mean) * (ms - mean)).sum::<f64>() / count;

        Some(Latency {
            min,
            max,
            mean,
            std_dev: spread.sqrt(),
        })
    }
}

/// A response that leaked data or granted access it should not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub request_id: u64,
    pub endpoint: String,
    pub test: String,
    pub message: String,
}

/// Counters collected over one run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub requests: u64,
    pub errors: u64,
    pub skipped: u64,
    pub findings: Vec<Finding>,
    latencies: Vec<Duration>,
}

impl RunStats {
    pub fn record_response(&mut self, elapsed: Duration) {
        self.requests += 1;
        self.latencies.push(elapsed);
    }

    pub fn record_error(&mut self) {
        self.requests += 1;
        self.errors += 1;
    }

    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_finding(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn latency(&self) -> Option<Latency> {
        Latency::of(&self.latencies)
    }

    pub fn report(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Requests sent: {}", self.requests),
            format!("Transport errors: {}", self.errors),
            format!("Skipped tests: {}", self.skipped),
        ];
        if let Some(latency) = self.latency() {
            lines.push(format!(
                "Latency: min {:.0}ms, max {:.0}ms, mean {:.1}ms, std dev {:.1}ms",
                latency.min, latency.max, latency.mean, latency.std_dev
            ));
        }
        lines.push(format!("Findings: {}", self.findings.len()));
        for finding in &self.findings {
            lines.push(format!(
                "  [{}][{}][{}] {}",
                finding.request_id, finding.endpoint, finding.test, finding.message
            ));
        }
        lines
    }
}
