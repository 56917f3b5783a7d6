use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use serde_json::json;

use form_session::{
    DispatchKey, FieldRenderer, FileDraftStore, FormSession, Gateways, OpenRequest, SessionError,
};
use form_spec::{FormIdentity, NavigationSignal, ReplyKind, ReplyPolicy};

use crate::config::RunnerConfig;
use crate::render::{AnswersRenderer, PromptRenderer};
use crate::sources::{DirTemplateSource, Outbox, PriorFile, read_value_map};

const MAX_PROMPT_ROUNDS: usize = 3;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long = "form-id", value_name = "ID")]
    pub form_id: String,
    #[arg(long = "form-class", value_name = "CLASS")]
    pub form_class: String,
    #[arg(long, value_name = "CUSTOMER", default_value = "local")]
    pub customer: String,
    #[arg(long, value_enum, default_value = "no-reply")]
    pub policy: PolicyArg,
    #[arg(long = "reply-form-id", value_name = "ID", requires = "reply_form_class")]
    pub reply_form_id: Option<String>,
    #[arg(long = "reply-form-class", value_name = "CLASS", requires = "reply_form_id")]
    pub reply_form_class: Option<String>,
    /// Answers keyed by response key, qnum or field id; prompts on stdin when absent
    #[arg(long, value_name = "answers.json")]
    pub answers: Option<PathBuf>,
    /// Prior responses used to seed field values
    #[arg(long, value_name = "prior.json")]
    pub prior: Option<PathBuf>,
    #[arg(long, value_name = "ID")]
    pub vehicle: Option<String>,
    #[arg(long, value_name = "ID")]
    pub dispatch: Option<String>,
    #[arg(long, value_name = "ID")]
    pub stop: Option<String>,
    #[arg(long, value_name = "ID")]
    pub action: Option<String>,
    /// Print the submitted responses as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyArg {
    NoReply,
    ReplyWithSame,
    ReplyWithNew,
    ReplyWithFreeform,
}

impl From<PolicyArg> for ReplyKind {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::NoReply => ReplyKind::NoReply,
            PolicyArg::ReplyWithSame => ReplyKind::ReplyWithSame,
            PolicyArg::ReplyWithNew => ReplyKind::ReplyWithNew,
            PolicyArg::ReplyWithFreeform => ReplyKind::ReplyWithFreeform,
        }
    }
}

pub fn run(args: RunArgs, config: &RunnerConfig) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_session(args, config))
}

fn reply_policy(args: &RunArgs) -> Result<ReplyPolicy> {
    let primary = FormIdentity::new(&args.customer, &args.form_id, &args.form_class);
    let mut policy = ReplyPolicy::new(args.policy.into(), primary);
    if let (Some(form_id), Some(form_class)) = (&args.reply_form_id, &args.reply_form_class) {
        policy = policy.with_reply(FormIdentity::new(&args.customer, form_id, form_class));
    }
    if policy.kind == ReplyKind::ReplyWithNew && policy.reply.is_none() {
        bail!("--policy reply-with-new needs --reply-form-id and --reply-form-class");
    }
    Ok(policy)
}

fn load_renderer(args: &RunArgs) -> Result<Box<dyn FieldRenderer>> {
    match &args.answers {
        Some(path) => {
            let raw = fs::read(path)
                .with_context(|| format!("failed to read answers {}", path.display()))?;
            let answers = read_value_map(&raw)
                .with_context(|| format!("invalid answers {}", path.display()))?;
            Ok(Box::new(AnswersRenderer::new(answers)))
        }
        None => Ok(Box::new(PromptRenderer)),
    }
}

async fn run_session(args: RunArgs, config: &RunnerConfig) -> Result<()> {
    let policy = reply_policy(&args)?;
    let dispatch = DispatchKey {
        customer_id: args.customer.clone(),
        vehicle_id: args.vehicle.clone().unwrap_or_default(),
        dispatch_id: args.dispatch.clone().unwrap_or_default(),
        stop_id: args.stop.clone().unwrap_or_default(),
        action_id: args.action.clone().unwrap_or_default(),
    };
    let request = config
        .auto
        .iter()
        .fold(OpenRequest::new(policy, dispatch), |request, (source, value)| {
            request.with_auto(*source, value.clone())
        });

    let drafts = Arc::new(FileDraftStore::new(&config.drafts_dir));
    let gateways = Gateways {
        templates: Arc::new(DirTemplateSource::new(&config.templates_dir)),
        priors: Arc::new(PriorFile::new(args.prior.clone())),
        drafts: drafts.clone(),
        submissions: Arc::new(Outbox::new(&config.outbox_dir)),
    };
    let renderer = load_renderer(&args)?;
    let interactive = args.answers.is_none();

    let mut session = FormSession::open(request, gateways).await?;
    let mut rounds = 0;
    loop {
        rounds += 1;
        match session.drive(renderer.as_ref()).await {
            Ok(NavigationSignal::Complete) => break,
            Ok(NavigationSignal::Continue(stage)) => {
                save_draft(&mut session).await;
                bail!(
                    "form incomplete at the {stage:?} stage; draft saved under {}",
                    config.drafts_dir.display()
                );
            }
            Ok(NavigationSignal::InvalidForm { reason }) => bail!("invalid form: {reason}"),
            Ok(NavigationSignal::Cancelled) => bail!("session cancelled"),
            Err(SessionError::Validation(errors)) => {
                for error in &errors {
                    eprintln!(
                        "{} ({}): {} [{}]",
                        error.key, error.field_id, error.message, error.code
                    );
                }
                if interactive && rounds < MAX_PROMPT_ROUNDS {
                    continue;
                }
                save_draft(&mut session).await;
                bail!("{} field(s) failed validation; draft saved", errors.len());
            }
            Err(err) => return Err(err.into()),
        }
    }

    let mut submissions = Vec::new();
    for (index, stage) in session.coordinator().stages().iter().enumerate() {
        if stage.mirrors_primary() {
            continue;
        }
        if let Some(reduction) = session.reduce_stage(index) {
            submissions.push(json!({
                "form": stage.template.identity.to_string(),
                "response": reduction.response,
            }));
        }
        if let Err(err) = drafts.discard(&stage.template.identity).await {
            tracing::warn!(error = %err, "stale draft left behind");
        }
    }

    if args.json {
        let summary = json!({
            "status": "complete",
            "session_id": session.id().to_string(),
            "submissions": submissions,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "submitted {} form(s) to {}",
            submissions.len(),
            config.outbox_dir.display()
        );
    }
    Ok(())
}

async fn save_draft(session: &mut FormSession) {
    if let Err(err) = session.snapshot_draft().await {
        tracing::warn!(error = %err, "draft snapshot aborted");
    }
}
