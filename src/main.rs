use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use patient_intake::config::IntakeConfig;
use patient_intake::error::FlowError;
use patient_intake::onboarding::{
    AccountRequest, AnswerValue, HttpIdentityProvider, IdentityProvider, IntakeRouteState,
    LocalIdentityProvider, NormalizerRegistry, OnboardingOrchestrator, StepInput, StepKind,
    Strategy, intake_routes,
};
use patient_intake::store::{LibSqlBackend, SubmissionStore};

type StdinLines = Lines<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = IntakeConfig::from_env();
    config.validate()?;

    eprintln!("Patient Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!(
        "   Status API: http://0.0.0.0:{}/api/intake/{{identity_id}}/status",
        config.http_port
    );

    // ── Database ─────────────────────────────────────────────────────────
    let store: Arc<dyn SubmissionStore> = match (&config.db_url, &config.db_auth_token) {
        (Some(url), Some(token)) => {
            eprintln!("   Database: {url}");
            Arc::new(
                LibSqlBackend::new_remote(url, token)
                    .await
                    .with_context(|| format!("failed to connect to {url}"))?,
            )
        }
        _ => {
            eprintln!("   Database: {}", config.db_path.display());
            Arc::new(
                LibSqlBackend::new_local(&config.db_path)
                    .await
                    .with_context(|| {
                        format!("failed to open database at {}", config.db_path.display())
                    })?,
            )
        }
    };

    // ── Identity ─────────────────────────────────────────────────────────
    let identities: Arc<dyn IdentityProvider> = match &config.auth_url {
        Some(url) => {
            eprintln!("   Accounts: {url}");
            Arc::new(HttpIdentityProvider::new(
                url.clone(),
                config.auth_api_key.clone(),
                config.auth_timeout,
            )?)
        }
        None => {
            eprintln!("   Accounts: local (not persisted)");
            Arc::new(LocalIdentityProvider::new())
        }
    };

    // Spawn the status server
    let app = intake_routes(IntakeRouteState::new(Arc::clone(&store)));
    let port = config.http_port;
    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await {
            Ok(listener) => {
                tracing::info!(port, "Intake status server started");
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Intake status server stopped");
                }
            }
            Err(e) => tracing::error!(port, error = %e, "Failed to bind status server port"),
        }
    });

    let registry = NormalizerRegistry::default();
    let orchestrator =
        OnboardingOrchestrator::new(store, identities, &config).with_normalizers(registry.clone());
    run_session(&orchestrator, &registry).await
}

/// Walk one intake session over stdin until it completes or input ends.
async fn run_session(
    orchestrator: &OnboardingOrchestrator,
    registry: &NormalizerRegistry,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut state = orchestrator.start();

    eprintln!("   Type your answers and press Enter. /quit to exit.\n");

    while !state.is_complete() {
        let step = state.current_step();
        println!("\n[{:>3}%] {}", state.progress(), step.prompt());

        let input = match step.kind() {
            StepKind::Info => {
                eprint!("(press Enter) ");
                match read_line(&mut lines).await? {
                    Some(_) => StepInput::Continue,
                    None => return Ok(()),
                }
            }
            StepKind::Question(key) => {
                if registry.strategy(key) == Some(Strategy::TextList) {
                    eprint!("(comma separated) ");
                }
                eprint!("> ");
                let Some(line) = read_line(&mut lines).await? else {
                    return Ok(());
                };
                StepInput::Answer(parse_answer(registry, key, &line))
            }
            StepKind::Account => match read_account(&mut lines).await? {
                Some(request) => StepInput::Account(request),
                None => return Ok(()),
            },
        };

        match orchestrator.submit(&mut state, input).await {
            Ok(transition) => {
                for warning in &transition.warnings {
                    eprintln!("   Warning: {warning}");
                }
            }
            Err(FlowError::AccountCreation(e)) => {
                eprintln!("   Could not create your account: {e}. Please try again.");
            }
            Err(e @ (FlowError::Transition(_) | FlowError::InputMismatch { .. })) => {
                eprintln!("   {e}. Please try again.");
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("\n[100%] {}", state.current_step().prompt());
    if let Some(identity) = state.identity() {
        println!("Your intake is saved under {}.", identity.id);
    }
    Ok(())
}

/// Next trimmed line, or `None` on EOF or `/quit`.
async fn read_line(lines: &mut StdinLines) -> anyhow::Result<Option<String>> {
    match lines.next_line().await.context("failed to read stdin")? {
        Some(line) if line.trim() == "/quit" => Ok(None),
        Some(line) => Ok(Some(line.trim().to_string())),
        None => Ok(None),
    }
}

async fn read_account(lines: &mut StdinLines) -> anyhow::Result<Option<AccountRequest>> {
    let mut fields = Vec::with_capacity(4);
    for label in ["Email", "Password", "First name", "Last name"] {
        eprint!("{label}: ");
        match read_line(lines).await? {
            Some(value) => fields.push(value),
            None => return Ok(None),
        }
    }
    let [email, password, first_name, last_name] = <[String; 4]>::try_from(fields)
        .map_err(|_| anyhow::anyhow!("incomplete account details"))?;
    Ok(Some(AccountRequest::new(
        email, password, first_name, last_name,
    )))
}

fn parse_answer(registry: &NormalizerRegistry, key: &str, line: &str) -> AnswerValue {
    match registry.strategy(key) {
        Some(Strategy::TextList) => AnswerValue::list(line.split(',')),
        _ => AnswerValue::text(line),
    }
}
