mod definition;
mod duplication;
mod logger;
mod pacer;
mod permutation;
mod request;
mod stats;
mod substitution;
mod testcode;
mod tls;
mod transport;
mod variable;
mod verifier;
mod workflow;
mod wrap;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use definition::Definition;
use logger::{Logger, RunInfo};
use pacer::Rate;
use testcode::TestCodes;
use transport::{HttpTransport, TransportOptions};
use workflow::{Engine, EngineOptions};

#[derive(FromArgs, Debug)]
/// Authorization fuzzer for HTTP APIs
struct Args {
    /// path to the API definition file
    #[argh(option, short = 'd')]
    definition: PathBuf,

    /// upstream proxy, e.g. http://127.0.0.1:8080
    #[argh(option, short = 'p')]
    proxy: Option<String>,

    /// additional trusted CA certificate (PEM)
    #[argh(option, short = 'c')]
    cert: Option<PathBuf>,

    /// accept any server certificate
    #[argh(switch, short = 'k')]
    insecure: bool,

    /// append the report to this file
    #[argh(option, short = 'o')]
    log: Option<PathBuf>,

    /// only test this endpoint path
    #[argh(option, short = 'e')]
    endpoint: Option<String>,

    /// maximum requests per second
    #[argh(option, short = 'r', default = "Rate::default()")]
    rate: Rate,

    /// comma separated test codes: hp,lp,np,rpp,bpp,mr,rpw,bpw,rps,rpspp,json,all
    #[argh(option, short = 't', default = "String::from(\"all\")")]
    tests: String,

    /// run permutation tests even when no base case succeeded
    #[argh(switch, short = 'f')]
    force: bool,

    /// request timeout in seconds
    #[argh(option, default = "5")]
    timeout: u64,

    /// dump every request and response
    #[argh(switch)]
    debug: bool,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    init_tracing(args.debug);

    let mut logger = Logger::new(args.debug, args.log.as_deref());
    logger.banner();

    let definition = match Definition::load(&args.definition)
        .with_context(|| format!("failed to load definition {}", args.definition.display()))
    {
        Ok(definition) => definition,
        Err(err) => {
            logger.fatal(&format!("{:#}", err));
            return Err(err);
        }
    };

    let (codes, unrecognised) = TestCodes::parse(&args.tests);
    if !unrecognised.is_empty() {
        logger.error(&format!("unrecognised test codes: {}", unrecognised.join(",")));
    }
    if codes.is_empty() {
        logger.error("no test codes enabled, nothing will be sent");
    }

    let transport_options = TransportOptions {
        proxy: args.proxy.clone(),
        local_cert: args.cert.clone(),
        insecure: args.insecure,
        timeout: Duration::from_secs(args.timeout),
    };
    let transport = match HttpTransport::new(&transport_options).context("failed to set up http client") {
        Ok(transport) => transport,
        Err(err) => {
            logger.fatal(&format!("{:#}", err));
            return Err(err);
        }
    };

    logger.run_info(&RunInfo {
        base_uri: &definition.base_uri,
        endpoints: definition.endpoint_count(),
        definition: Some(&args.definition),
        cert: args.cert.as_deref(),
        log: args.log.as_deref(),
        proxy: args.proxy.as_deref(),
        rate: Some(args.rate),
        variables: definition.vars.len(),
        tests: codes.to_string(),
    });

    let options = EngineOptions {
        codes,
        force: args.force,
        endpoint: args.endpoint,
        rate: args.rate,
    };
    Engine::new(&definition, transport, logger, options).run();

    Ok(())
}
