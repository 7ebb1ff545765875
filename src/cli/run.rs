use crate::cli::RunArgs;
use crate::conditions::ConditionExplorer;
use crate::config::Config;
use crate::documents::{read_documents, DocumentSet};
use crate::engine::{ConvergenceController, Generator, Reviewer};
use crate::error::{ConfigError, RuralplanError};
use crate::gateway::ModelGateway;
use crate::navigator::Navigator;
use crate::output::{build_summary, render_plan, write_compiled_report, write_plan, write_summary};
use crate::session::Session;
use crate::tasks::prompt::{compose_prompt, VillageContext};
use crate::tasks::TaskRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Config, task table and documents, all validated before any model call
pub struct Prepared {
    pub config: Config,
    pub registry: TaskRegistry,
    pub documents: DocumentSet,
}

/// Load the config file and apply CLI overrides
pub fn load_config(args: &RunArgs) -> Result<Config, ConfigError> {
    info!("Loading config from {:?}", args.config);
    let mut config = Config::load(&args.config)?;

    if let Some(village) = &args.village {
        config.village_name = village.clone();
    }
    if let Some(documents) = &args.documents {
        config.documents_dir = documents.clone();
    }
    if let Some(output_dir) = &args.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(review_model) = &args.review_model {
        config.review_model = Some(review_model.clone());
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency;
    }
    if let Some(max_iterations) = args.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(deadline_sec) = args.deadline_sec {
        config.deadline_sec = Some(deadline_sec);
    }

    Ok(config)
}

pub fn prepare(args: &RunArgs) -> Result<Prepared, RuralplanError> {
    let config = load_config(args)?;
    config.validate()?;
    let registry = TaskRegistry::new(config.tasks.clone())?;
    let documents = read_documents(&config.documents_dir, &config.document_include)?;
    if documents.is_empty() {
        warn!(
            "No documents matched in {}; drafting without source material",
            config.documents_dir.display()
        );
    }

    Ok(Prepared {
        config,
        registry,
        documents,
    })
}

pub async fn execute(args: RunArgs) -> anyhow::Result<()> {
    let Prepared {
        config,
        registry,
        documents,
    } = prepare(&args)?;

    if args.dry_run {
        info!("DRY RUN - no model calls will be made");
        print_execution_plan(&config, &registry, &documents, args.resume);
        return Ok(());
    }

    // Credentials are resolved here; a missing key stops the run before any task starts
    let gateway = Arc::new(ModelGateway::from_config(&config, CancellationToken::new())?);

    let interrupt = {
        let cancel = gateway.cancel_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling in-flight calls");
                cancel.cancel();
            }
        })
    };

    let checkpoint_path = Session::checkpoint_path(&config.output_dir);
    let mut session = if args.resume {
        Session::resume(&checkpoint_path, &config.village_name, &registry)
            .map_err(RuralplanError::from)?
            .unwrap_or_else(|| {
                info!("No checkpoint at {:?}, starting fresh", checkpoint_path);
                Session::new(&config.village_name, &registry)
            })
    } else {
        Session::new(&config.village_name, &registry)
    };
    info!(
        "Session {} for {}: {} tasks, {} documents",
        session.id,
        config.village_name,
        registry.len(),
        documents.len()
    );

    let mut context = VillageContext::new(&config.village_name, documents);
    if config.conditions.enabled {
        let explorer = ConditionExplorer::new(
            gateway.clone(),
            config.conditions_model(),
            config.conditions.retry.clone(),
        );
        let conditions = explorer
            .run(&context, &config.conditions.natural, &config.conditions.policy)
            .await;
        context = context.with_conditions(conditions);
    }
    if config.navigator.enabled {
        let navigator = Navigator::new(
            gateway.clone(),
            config.navigator_model(),
            config.navigator.retry.clone(),
        );
        let positions = navigator.run(&context).await;
        context = context.with_positions(positions);
    }
    let context = Arc::new(context);
    let registry = Arc::new(registry);

    let generator = Generator::new(
        gateway.clone(),
        context.clone(),
        config.model.clone(),
        config.generation_retry.clone(),
    );
    let reviewer = Reviewer::new(
        gateway.clone(),
        context.clone(),
        config.review_model(),
        config.review.clone(),
        config.review_retry.clone(),
    );
    let deadline = config.deadline_sec.map(Duration::from_secs);
    let controller = ConvergenceController::new(
        generator,
        reviewer,
        registry.clone(),
        config.max_iterations,
    )
    .with_deadline(deadline)
    .with_checkpoint(config.output.checkpoint.then(|| checkpoint_path.clone()));

    let outcome = controller.run(&mut session).await;

    // The plan is written whatever the outcome
    let markdown = render_plan(
        &config.village_name,
        &registry,
        &session.plan,
        &session.review_log,
    );
    let plan_path = write_plan(&config.output_dir, &markdown).map_err(RuralplanError::from)?;
    println!("Plan written to {}", plan_path.display());

    if config.output.compose_report && outcome.converged() {
        info!("Composing final report with {}", config.compose_model());
        match gateway
            .invoke(
                &compose_prompt(&config.village_name, &markdown),
                config.compose_model(),
            )
            .await
        {
            Ok(text) => match write_compiled_report(&config.output_dir, &text) {
                Ok(path) => println!("Report written to {}", path.display()),
                Err(e) => warn!("Failed to write compiled report: {}", e),
            },
            Err(e) => warn!("Failed to compose report, plan.md remains the deliverable: {}", e),
        }
    }

    let summary = build_summary(
        &registry,
        &session,
        &outcome,
        &context.conditions,
        &context.positions,
        gateway.calls(),
        &config.output_dir,
    );
    write_summary(&config.output_dir, &summary).map_err(RuralplanError::from)?;
    interrupt.abort();

    info!(
        "Finished in {:.1}s: {} after {} iterations, {} ({} model calls)",
        outcome.elapsed.as_secs_f64(),
        outcome.terminal,
        outcome.state.iteration,
        outcome.summary,
        gateway.calls()
    );
    if !outcome.converged() && !outcome.summary.failed.is_empty() {
        warn!("Unconverged tasks: {}", outcome.summary.failed.join(", "));
    }

    if args.fail_on_abort {
        if let Some(e) = outcome.abort_error(deadline) {
            error!("Exiting with error: {}", e);
            return Err(RuralplanError::from(e).into());
        }
    }

    Ok(())
}

fn print_execution_plan(
    config: &Config,
    registry: &TaskRegistry,
    documents: &DocumentSet,
    resume: bool,
) {
    println!("\n=== Execution Plan ===\n");
    println!("Village: {}", config.village_name);
    println!("Documents: {:?} ({} loaded)", config.documents_dir, documents.len());
    println!("Output dir: {:?}", config.output_dir);
    println!("Generation model: {}", config.model);
    println!("Review model: {}", config.review_model());
    println!("Concurrency: {}", config.concurrency);
    println!("Max iterations: {}", config.max_iterations);
    if let Some(deadline) = config.deadline_sec {
        println!("Deadline: {}s", deadline);
    }
    if config.conditions.enabled {
        println!(
            "Conditions: {} natural, {} policy ({})",
            config.conditions.natural.len(),
            config.conditions.policy.len(),
            config.conditions_model()
        );
    }
    if config.navigator.enabled {
        println!("Navigator: {}", config.navigator_model());
    }
    if resume {
        println!(
            "Resume from: {:?}",
            Session::checkpoint_path(&config.output_dir)
        );
    }

    println!("\nTasks:");
    for task in registry.iter() {
        println!("  - {} ({})", task.id, task.name);
    }
    println!();
}
