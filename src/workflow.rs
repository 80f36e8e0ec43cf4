//! Runs every enabled strategy against every endpoint operation of a
//! definition, one request at a time.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::definition::{Definition, EndpointOperation, Method};
use crate::duplication;
use crate::logger::Logger;
use crate::pacer::{Pacer, Rate};
use crate::permutation::{self, PermutationCache};
use crate::request::RequestDescriptor;
use crate::stats::{Finding, RunStats};
use crate::substitution::{self, Assignment, Privilege, Substitution};
use crate::testcode::{TestCode, TestCodes};
use crate::transport::{self, Transport};
use crate::variable;
use crate::verifier::{self, Expectation, Verdict};
use crate::wrap::{self, BodyEnvelope, ParamEnvelope};

/// Carries the request id so server-side logs can be matched to the report.
pub const REQUEST_ID_HEADER: &str = "X-Privilege-Fuzzer-Request-Id";

#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub codes: TestCodes,
    /// Run permutation sweeps even when no base case succeeded.
    pub force: bool,
    /// Only test this endpoint path.
    pub endpoint: Option<String>,
    pub rate: Rate,
}

/// Which credentials a request is sent with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    As(Privilege),
    Anonymous,
}

const LOW_AUTH: Auth = Auth::As(Privilege::Low);

pub struct Engine<'d, T> {
    definition: &'d Definition,
    transport: T,
    logger: Logger,
    options: EngineOptions,
    permutations: PermutationCache,
    pacer: Pacer,
    last_request_id: u64,
    stats: RunStats,
}

impl<'d, T: Transport> Engine<'d, T> {
    pub fn new(definition: &'d Definition, transport: T, logger: Logger, options: EngineOptions) -> Self {
        let pacer = Pacer::new(options.rate);
        debug!(interval = ?pacer.interval(), "pacing requests");
        Engine {
            definition,
            transport,
            logger,
            pacer,
            options,
            permutations: PermutationCache::new(),
            last_request_id: 0,
            stats: RunStats::default(),
        }
    }

    pub fn run(&mut self) {
        let definition = self.definition;
        self.logger.starting();

        for (path, operations) in &definition.api.endpoints {
            if let Some(only) = &self.options.endpoint {
                if only != path {
                    continue;
                }
            }
            info!(%path, operations = operations.len(), "testing endpoint");

            for operation in operations {
                self.test_operation(path, operation);
            }
            if self.enabled(TestCode::MethodReplacement) {
                self.method_replacement(path, operations);
            }
        }

        debug!(
            requests = self.last_request_id,
            cached_permutations = self.permutations.len(),
            "run finished"
        );
        self.logger.summary(&self.stats);
    }

    fn enabled(&self, code: TestCode) -> bool {
        self.options.codes.contains(code)
    }

    fn test_operation(&mut self, path: &str, operation: &EndpointOperation) {
        let template = RequestDescriptor::template(self.definition, path, operation);
        let label = format!("{} {}", operation.method, path);

        if self.enabled(TestCode::HighPrivileged) {
            if operation.is_destructive() {
                debug!(%label, "not sending high privileged request to delete operation");
            } else {
                self.high_privileged(&label, &template);
            }
        }
        if self.enabled(TestCode::LowPrivilegedPermutations) {
            self.low_privileged_permutations(&label, &template);
        }
        if self.enabled(TestCode::NoPrivilege) {
            self.no_privilege(&label, &template);
        }
        if self.enabled(TestCode::RequestParamPollution) {
            self.request_param_pollution(&label, &template);
        }
        if self.enabled(TestCode::BodyParamPollution) {
            self.body_param_pollution(&label, &template);
        }
        if self.enabled(TestCode::RequestParamWrap) {
            self.request_param_wrap(&label, &template);
        }
        if self.enabled(TestCode::BodyParamWrap) {
            self.body_param_wrap(&label, &template);
        }
        if self.enabled(TestCode::RequestParamSubstitution) {
            self.request_param_substitution(&label, &template);
        }
        if self.enabled(TestCode::RequestParamSubstitutionPollution) {
            self.request_param_substitution_pollution(&label, &template);
        }
        if self.enabled(TestCode::JsonSuffix) {
            self.json_suffix(&label, &template);
        }
    }

    fn high_privileged(&mut self, label: &str, template: &RequestDescriptor) {
        let assignment = Assignment::uniform(Privilege::High);
        let request = self.render(template, &assignment, Auth::As(Privilege::High));
        self.execute(label, TestCode::HighPrivileged.code(), &request, &Expectation::Success);
    }

    fn low_privileged_permutations(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::LowPrivilegedPermutations;
        if !self.base_case(label, test, &[template]) {
            return;
        }
        let tokens = substitution::sorted_tokens(template, &self.definition.vars);
        let permutations = self.permutations.all_combinations(tokens.len());
        self.sweep(label, test, template, &tokens, &permutations);
    }

    fn no_privilege(&mut self, label: &str, template: &RequestDescriptor) {
        self.denied_with_high_vars(label, TestCode::NoPrivilege.code(), template, Auth::Anonymous);
    }

    fn request_param_pollution(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::RequestParamPollution;
        let targets = self.request_param_targets(template);
        if targets.is_empty() {
            return;
        }
        let polluted = duplication::pollute_request_params(template, &targets);
        self.pollution_sweep(label, test, &[template, &polluted], &polluted, &targets);
    }

    fn body_param_pollution(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::BodyParamPollution;
        let targets = duplication::targets(variable::find_in_body(&template.body_params), &self.definition.vars);
        if targets.is_empty() {
            return;
        }
        let polluted = duplication::pollute_body_params(template, &targets);
        self.pollution_sweep(label, test, &[template, &polluted], &polluted, &targets);
    }

    fn request_param_wrap(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::RequestParamWrap;
        let targets = self.request_param_targets(template);
        if targets.is_empty() || !self.base_case(label, test, &[template]) {
            return;
        }
        for envelope in ParamEnvelope::ALL {
            let wrapped = wrap::wrap_request_params(template, &targets, envelope);
            let name = format!("{}-{}", test, envelope);
            self.denied_with_high_vars(label, &name, &wrapped, LOW_AUTH);
        }
    }

    fn body_param_wrap(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::BodyParamWrap;
        let targets = duplication::targets(variable::find_in_body(&template.body_params), &self.definition.vars);
        if targets.is_empty() || !self.base_case(label, test, &[template]) {
            return;
        }
        for envelope in BodyEnvelope::ALL {
            let wrapped = wrap::wrap_body_params(template, &targets, envelope);
            let name = format!("{}-{}", test, envelope);
            self.denied_with_high_vars(label, &name, &wrapped, LOW_AUTH);
        }
    }

    fn request_param_substitution(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::RequestParamSubstitution;
        let targets = self.request_param_targets(template);
        if targets.is_empty() {
            return;
        }
        let moved = duplication::move_params_to_body(template, &targets);
        if !self.base_case(label, test, &[template, &moved]) {
            return;
        }
        let tokens = substitution::sorted_tokens(&moved, &self.definition.vars);
        let permutations = self.permutations.all_combinations(tokens.len());
        self.sweep(label, test, &moved, &tokens, &permutations);
    }

    fn request_param_substitution_pollution(&mut self, label: &str, template: &RequestDescriptor) {
        let test = TestCode::RequestParamSubstitutionPollution;
        let targets = self.request_param_targets(template);
        if targets.is_empty() {
            return;
        }
        let moved = duplication::move_params_to_body(template, &targets);
        let split = duplication::split_params_across_body(template, &targets);
        self.pollution_sweep(label, test, &[template, &moved], &split, &targets);
    }

    fn json_suffix(&mut self, label: &str, template: &RequestDescriptor) {
        let mut suffixed = template.clone();
        suffixed.endpoint.push_str(".json");
        self.denied_with_high_vars(label, TestCode::JsonSuffix.code(), &suffixed, LOW_AUTH);
    }

    /// Tries every globally declared method the endpoint does not use.
    fn method_replacement(&mut self, path: &str, operations: &[EndpointOperation]) {
        let Some(first) = operations.first() else {
            return;
        };
        let template = RequestDescriptor::template(self.definition, path, first);
        for method in unused_methods(&self.definition.api.global_methods, operations) {
            let replaced = template.with_method(method);
            let label = format!("{} {}", method, path);
            self.denied_with_high_vars(&label, TestCode::MethodReplacement.code(), &replaced, LOW_AUTH);
        }
    }

    fn request_param_targets(&self, template: &RequestDescriptor) -> BTreeSet<String> {
        duplication::targets(variable::find_in_params(&template.request_params), &self.definition.vars)
    }

    /// Runs the base cases, then sweeps `polluted` over mixed-privilege
    /// assignments of every pair.
    fn pollution_sweep(
        &mut self,
        label: &str,
        test: TestCode,
        base_cases: &[&RequestDescriptor],
        polluted: &RequestDescriptor,
        targets: &BTreeSet<String>,
    ) {
        if !self.base_case(label, test, base_cases) {
            return;
        }
        let slots = duplication::pair_slots(targets);
        let permutations = self.permutations.opposite_combinations(slots.len());
        self.sweep(label, test, polluted, &slots, &permutations);
    }

    /// Sends each candidate as an all-low request until one succeeds.
    /// Returns whether the dependent sweep should run.
    fn base_case(&mut self, label: &str, test: TestCode, candidates: &[&RequestDescriptor]) -> bool {
        let assignment = Assignment::uniform(Privilege::Low);
        let name = format!("{}-base", test);
        for candidate in candidates {
            let request = self.render(candidate, &assignment, LOW_AUTH);
            let verdict = self.execute(label, &name, &request, &Expectation::Success);
            if verdict.map_or(false, |verdict| verdict.is_success()) {
                return true;
            }
        }

        if self.options.force {
            self.logger
                .message(&format!("[{}][{}] no base case succeeded, forcing tests", label, test));
            return true;
        }
        self.logger
            .message(&format!("[{}][{}] no base case succeeded, skipping tests", label, test));
        self.stats.record_skip();
        false
    }

    /// One low privileged request per permutation, the all-low one excluded.
    fn sweep(
        &mut self,
        label: &str,
        test: TestCode,
        template: &RequestDescriptor,
        slots: &[String],
        permutations: &[String],
    ) {
        for permutation in permutations {
            if permutation::is_all_low(permutation) {
                continue;
            }
            let Some(assignment) = Assignment::from_permutation(slots, permutation, Privilege::Low) else {
                warn!(%permutation, slots = slots.len(), "permutation does not fit slots");
                continue;
            };
            let request = self.render(template, &assignment, LOW_AUTH);
            let banned = Substitution::new(&self.definition.vars, &assignment).banned_words(template);
            self.execute(label, test.code(), &request, &Expectation::Denied { banned });
        }
    }

    fn denied_with_high_vars(&mut self, label: &str, test: &str, template: &RequestDescriptor, auth: Auth) {
        let assignment = Assignment::uniform(Privilege::High);
        let request = self.render(template, &assignment, auth);
        let banned = Substitution::new(&self.definition.vars, &assignment).banned_words(template);
        self.execute(label, test, &request, &Expectation::Denied { banned });
    }

    fn render(&self, template: &RequestDescriptor, assignment: &Assignment, auth: Auth) -> RequestDescriptor {
        let definition = self.definition;
        let substituted = Substitution::new(&definition.vars, assignment).apply(template);
        match auth {
            Auth::As(privilege) => substituted.with_auth(&definition.auth, privilege),
            Auth::Anonymous => substituted.without_auth(&definition.auth),
        }
    }

    /// Sends one request, reports the verdict and waits out the rate limit.
    fn execute(
        &mut self,
        label: &str,
        test: &str,
        request: &RequestDescriptor,
        expectation: &Expectation,
    ) -> Option<Verdict> {
        let started = Instant::now();
        self.last_request_id += 1;
        let request_id = self.last_request_id;

        let mut prepared = transport::prepare(request);
        prepared
            .headers
            .push((REQUEST_ID_HEADER.to_string(), request_id.to_string()));

        self.logger.test_prefix(request_id, label, test);
        self.logger.dump_request(&prepared);

        let verdict = match self.transport.send(&prepared) {
            Ok(response) => {
                self.stats.record_response(started.elapsed());
                self.logger.dump_response(&response);
                let verdict = verifier::verify(response.status, &response.body, expectation);
                self.logger.test_result(&verdict.to_string());
                if verdict.is_finding() {
                    self.logger.finding(&prepared);
                    self.stats.record_finding(Finding {
                        request_id,
                        endpoint: label.to_string(),
                        test: test.to_string(),
                        message: verdict.to_string(),
                    });
                }
                Some(verdict)
            }
            Err(err) => {
                warn!(request_id, error = %err, "request failed");
                self.stats.record_error();
                self.logger.test_result(&format!("skipping due to error: {}", err));
                None
            }
        };

        self.pacer.pace(started);
        verdict
    }
}

/// Global methods no operation of the endpoint declares, in declaration order.
pub fn unused_methods(global: &[Method], operations: &[EndpointOperation]) -> Vec<Method> {
    let used: BTreeSet<Method> = operations.iter().map(|operation| operation.method).collect();
    let mut unused = Vec::new();
    for method in global {
        if !used.contains(method) && !unused.contains(method) {
            unused.push(*method);
        }
    }
    unused
}
