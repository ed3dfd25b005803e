use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use chassis_assistant::api::HttpAssistantApi;
use chassis_assistant::command::{self, Command, HELP};
use chassis_assistant::config::{self, AssistantConfig, HttpTimeouts};
use chassis_assistant::context::{ChassisElement, PageSnapshot};
use chassis_assistant::error::AssistantError;
use chassis_assistant::reducer::FacetFlag;
use chassis_assistant::render::render;
use chassis_assistant::types::{Liked, now_timestamp};
use chassis_assistant::widget::{AssistantWidget, init_assistant};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Assistant(#[from] AssistantError),
    #[error("stdin read failed: {0}")]
    Stdin(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "chassis-assistant", about = "Chassis AI assistant in the terminal")]
struct Cli {
    #[arg(long, env = "ASSISTANT_API_SERVER")]
    api_server: String,

    #[arg(long, env = "ASSISTANT_MOUNT_ELEMENT_ID", default_value = config::DEFAULT_MOUNT_ELEMENT_ID)]
    mount: String,

    #[arg(long, env = "ASSISTANT_CHASSIS_ELEMENT_ID", default_value = config::DEFAULT_CHASSIS_ELEMENT_ID)]
    chassis_element: String,

    #[arg(long, env = "ASSISTANT_USER_NAME_ELEMENT_ID", default_value = config::DEFAULT_USER_NAME_ELEMENT_ID)]
    user_element: String,

    #[arg(long, env = "ASSISTANT_REQUEST_TIMEOUT_SECS", default_value_t = config::DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    #[arg(long, env = "ASSISTANT_CONNECT_TIMEOUT_SECS", default_value_t = config::DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout_secs: u64,

    /// Chassis number shown on the starting page.
    #[arg(long)]
    chassis_no: Option<String>,

    /// Two-digit order year shown on the starting page.
    #[arg(long)]
    order_year: Option<String>,

    /// REI link of the starting page; selects the division.
    #[arg(long)]
    rei_url: Option<String>,

    /// Signed-in user name.
    #[arg(long)]
    user: Option<String>,

    /// Start with the widget open.
    #[arg(long)]
    shown: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = AssistantConfig::new(&cli.mount, &cli.api_server)?
        .with_chassis_element_id(&cli.chassis_element)
        .with_user_name_element_id(&cli.user_element)
        .with_timeouts(HttpTimeouts { request_secs: cli.request_timeout_secs, connect_secs: cli.connect_timeout_secs });

    let chassis = (cli.chassis_no.is_some() || cli.rei_url.is_some()).then(|| ChassisElement {
        chassis_no: cli.chassis_no,
        order_year: cli.order_year,
        rei_url: cli.rei_url,
    });
    let page = Arc::new(PageSnapshot::new(chassis, cli.user.map(|name| greeting(&name))));
    let api = HttpAssistantApi::new(&config).map_err(AssistantError::from)?;
    let widget = init_assistant(config, page.clone())?;
    widget.session().set_shown(cli.shown);

    run_repl(&widget, &page, &api).await
}

fn greeting(name: &str) -> String {
    format!("Hello, {name}")
}

async fn run_repl(widget: &AssistantWidget, page: &PageSnapshot, api: &HttpAssistantApi) -> Result<(), CliError> {
    let mut states = widget.session().subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{}", render(&states.borrow_and_update(), now_timestamp()));

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let screen = render(&states.borrow_and_update(), now_timestamp());
                println!("{screen}");
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    widget.unmount();
                    return Ok(());
                };
                match command::parse(&line) {
                    Ok(Some(Command::Quit)) => {
                        widget.unmount();
                        return Ok(());
                    }
                    Ok(Some(command)) => dispatch(widget, page, api, command),
                    Ok(None) => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }
}

/// Run one intent. Network-bound intents run in the background so the
/// screen keeps redrawing while they are in flight.
fn dispatch(widget: &AssistantWidget, page: &PageSnapshot, api: &HttpAssistantApi, command: Command) {
    let session = widget.session().clone();
    match command {
        Command::Send(text) => {
            tokio::spawn(async move {
                let _ = session.send_message(&text).await;
            });
        }
        Command::Like(number) => feedback(widget, number, Liked::Liked),
        Command::Dislike(number) => feedback(widget, number, Liked::Disliked),
        Command::Search => {
            tokio::spawn(async move {
                if let Err(e) = session.initiate_search().await {
                    warn!(error = %e, "search unavailable");
                }
            });
        }
        Command::Select(id) => facet(widget, &id, FacetFlag::Selected),
        Command::Mandatory(id) => facet(widget, &id, FacetFlag::Mandatory),
        Command::Count(count) => {
            if session.set_count_needed(count).is_none() {
                eprintln!("no search form open; use /search");
            }
        }
        Command::Submit => {
            tokio::spawn(async move {
                if let Err(AssistantError::NotComposing) = session.submit_composition().await {
                    eprintln!("no search form open; use /search");
                }
            });
        }
        Command::Discard => {
            session.discard_search();
        }
        Command::Delete => {
            tokio::spawn(async move {
                if let Ok(counts) = session.delete_conversation().await {
                    eprintln!("deleted {} conversation(s), {} message(s)", counts.conversation, counts.message);
                }
            });
        }
        Command::DeleteAll => {
            tokio::spawn(async move {
                if let Ok(counts) = session.delete_all_conversations().await {
                    eprintln!("deleted {} conversation(s), {} message(s)", counts.conversation, counts.message);
                }
            });
        }
        Command::Goto(element) => {
            page.set_chassis_element(Some(element));
            widget.navigate();
        }
        Command::User(name) => {
            page.set_greeting(Some(greeting(&name)));
            widget.navigate();
        }
        Command::Refresh => {
            widget.schedule_refresh();
        }
        Command::Show => session.set_shown(true),
        Command::Hide => session.set_shown(false),
        Command::Version => {
            let api = api.clone();
            tokio::spawn(async move {
                match api.version().await {
                    Ok(info) => println!("backend version {}", info.version),
                    Err(e) => eprintln!("version unavailable: {e}"),
                }
            });
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => widget.unmount(),
    }
}

fn feedback(widget: &AssistantWidget, number: usize, requested: Liked) {
    let session = widget.session().clone();
    let Some(message_id) = command::assistant_message_id(&session.snapshot(), number) else {
        eprintln!("message {number} is not an assistant reply");
        return;
    };
    tokio::spawn(async move {
        session.toggle_feedback(&message_id, requested).await;
    });
}

fn facet(widget: &AssistantWidget, id: &str, flag: FacetFlag) {
    if widget.session().toggle_facet(id, flag).is_none() {
        eprintln!("no facet {id} in an open search form");
    }
}
