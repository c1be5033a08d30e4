mod callbacks;
mod commands;
mod config;
mod messages;
mod messenger;
mod notify;
mod prompt;
mod scan_params;
mod scanner;
mod schedule;
mod storage;
mod subscribers;
#[cfg(test)]
mod testing;

use std::sync::Arc;

use callbacks::ButtonTap;
use commands::{BotState, Command};
use config::Config;
use notify::Notifier;
use scan_params::ScanParams;
use scanner::{Scanner, SqliteScanner};
use schedule::Scheduler;
use subscribers::Subscribers;
use teloxide::adaptors::throttle::Limits;
use teloxide::dptree::deps;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

pub type Bot = teloxide::adaptors::Throttle<teloxide::Bot>;

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::Error),
    #[error("no bot_token in config and TELOXIDE_TOKEN is not set")]
    MissingToken,
    #[error("cannot load subscribers: {0}")]
    Subscribers(#[from] subscribers::Error),
    #[error("cannot load scan parameters: {0}")]
    ScanParams(#[from] scan_params::Error),
    #[error("cannot open post database: {0}")]
    Scanner(#[from] scanner::Error),
}

async fn answer(bot: Bot, msg: Message, cmd: Command, state: BotState) -> ResponseResult<()> {
    log::info!("{:?} from {}", cmd, msg.chat.id);
    commands::execute(&state, &bot, msg.chat.id, cmd).await
}

async fn button_tap(bot: Bot, query: CallbackQuery, state: BotState) -> ResponseResult<()> {
    callbacks::handle_tap(&bot, state.scanner.as_ref(), ButtonTap::from(&query)).await
}

async fn run() -> Result<(), StartupError> {
    let config = Config::load(&Config::path_from_env()).await?;

    let token = match &config.bot_token {
        Some(token) => token.clone(),
        None => std::env::var("TELOXIDE_TOKEN").map_err(|_| StartupError::MissingToken)?,
    };
    let bot = teloxide::Bot::new(token).throttle(Limits::default());

    let subscribers = Arc::new(Mutex::new(Subscribers::load(&config.subs_file).await?));
    let params = Arc::new(Mutex::new(ScanParams::load(&config.scan_params_file).await?));
    let scanner: Arc<dyn Scanner> =
        Arc::new(SqliteScanner::connect(&config.database_url, params.clone()).await?);

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Couldn't register bot commands: {e}");
    }

    let notifier = Arc::new(Notifier::new(scanner.clone(), subscribers.clone()));
    let state = BotState {
        subscribers,
        params,
        scanner,
        notifier: notifier.clone(),
        restart: Arc::new(Notify::new()),
    };

    log::info!(
        "Bot initiated. Waiting {} seconds until first notification",
        config.startup_secs
    );
    let scheduler = Scheduler::start(
        notifier,
        Arc::new(bot.clone()),
        config.startup_delay(),
        config.update_hour,
        config.timezone,
    );

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(answer),
        )
        .branch(Update::filter_callback_query().endpoint(button_tap));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(deps![state.clone()])
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build();

    // No self-restart: the process exits and its supervisor starts it again.
    let shutdown = dispatcher.shutdown_token();
    let restart = state.restart.clone();
    tokio::spawn(async move {
        restart.notified().await;
        match shutdown.shutdown() {
            Ok(stopped) => stopped.await,
            Err(_) => log::warn!("Restart requested but dispatcher is not running"),
        }
    });

    dispatcher.dispatch().await;

    scheduler.shutdown();
    log::info!("Bot stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting bot...");

    if let Err(e) = run().await {
        log::error!("{e}");
        std::process::exit(1);
    }
}
