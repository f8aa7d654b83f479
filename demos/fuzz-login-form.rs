//! first, update the variable named `target` with a login form you're allowed to test
//!
//! then run the example with the following command
//! RUST_LOG="locfuzz=info" cargo run --example fuzz-login-form
use std::sync::Arc;

use locfuzz::client::BlockingClient;
use locfuzz::events::{FuzzerCompleted, FuzzerProgress};
use locfuzz::findings::{Alert, Confidence, Risk};
use locfuzz::prelude::*;
use locfuzz::processors::{
    AntiCsrfTokenRefresher, MessageTagger, PayloadReflectionDetector, RegexAlertProcessor,
    RequestContentLengthUpdater, ResultProcessor,
};

use tracing::subscriber::set_global_default;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // locfuzz logs through the tracing library; RUST_LOG picks what gets printed
    let subscriber = tracing_subscriber::fmt()
        .with_thread_ids(true)
        .with_env_filter(EnvFilter::from_default_env())
        .finish();

    set_global_default(subscriber)?;

    let target = "http://localhost:8000";

    let options = FuzzerOptions::default()
        .with_thread_count(4)
        .with_retries_on_io_error(1)
        .with_max_errors_allowed(Some(50))
        .with_strategy(ReplacementStrategy::DepthFirst);

    let client = BlockingClient::new(options.max_redirects(), options.request_timeout())?;

    // the template; USER and PASS mark the fuzz locations
    let template = HttpMessage::new(
        format!("POST {target}/login HTTP/1.1\r\nHost: localhost:8000\r\nContent-Type: application/x-www-form-urlencoded\r\n"),
        "csrf=none&user=USER&pass=PASS",
    )?;

    let users = Wordlist::with_words(["admin", "root", "guest"])
        .name("users")
        .build();

    let passwords = Wordlist::with_words(["admin", "password", "123456", "letmein", "<script>"])
        .name("passwords")
        .build();

    let user = MessageLocation::locate(&template, MessageSection::RequestBody, "USER")?;
    let pass = MessageLocation::locate(&template, MessageSection::RequestBody, "PASS")?;

    // a fresh token is read from the form before every attempt
    let form = HttpMessage::get(&format!("{target}/login"))?;

    let disclosure = Alert::new(Risk::Medium, Confidence::Low, "Application Error Disclosure")
        .with_rule_id(90022)
        .with_description("the response contains an error message that may disclose sensitive information");

    // only keep the responses that differ from a failed login
    let interesting = ResultProcessor::new("drop-failed-logins", |_utils, result| {
        let failed = result
            .message()
            .response()
            .is_some_and(|response| response.text().contains("invalid credentials"));

        Ok(if failed { Action::Discard } else { Action::Keep })
    });

    let fuzzer = HttpFuzzer::builder()
        .sender(Arc::new(client))
        .message(template)
        .locations([FuzzLocation::new(user, users), FuzzLocation::new(pass, passwords)])
        .options(options)
        .processor(AntiCsrfTokenRefresher::new("csrf", form)?)
        .processor(RequestContentLengthUpdater::new())
        .processor(RegexAlertProcessor::new(r"(?i)(stack trace|exception in thread)", disclosure)?)
        .processor(PayloadReflectionDetector::new())
        .processor(MessageTagger::new("welcome", r"(?i)welcome back")?)
        .processor(interesting)
        .build()?;

    fuzzer.events().subscribe(|progress: FuzzerProgress| {
        if progress.done % 5 == 0 {
            info!(done = progress.done, total = progress.total, "progress");
        }
    });

    fuzzer.events().subscribe(|completed: FuzzerCompleted| {
        if !completed.successfully {
            warn!("fuzzer was stopped early");
        }
    });

    fuzzer.run()?;

    for result in fuzzer.results() {
        println!("{result}");
    }

    for error in fuzzer.errors() {
        println!("error: {error}");
    }

    for alert in fuzzer.alerts() {
        println!("alert: {} ({:?}) at {}", alert.name, alert.risk, alert.url);
    }

    // search every recorded message for a session cookie
    let cookies = fuzzer.search("(?i)set-cookie: session=", false, Some(10))?;
    println!("{} result(s) set a session cookie", cookies.len());

    println!("{}", fuzzer.statistics());

    Ok(())
}
