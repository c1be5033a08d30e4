use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use teloxide::macros::BotCommands;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands as _;
use teloxide::RequestError;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

use crate::messages;
use crate::messenger::Messenger;
use crate::notify::{send_prompt, Notifier};
use crate::prompt;
use crate::scan_params::{self, ParamValue, ScanParams};
use crate::scanner::{format_timestamp, Scanner};
use crate::subscribers::Subscribers;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "receive notifications in this chat.")]
    Sub,
    #[command(description = "stop receiving notifications.")]
    Unsub,
    #[command(description = "list subscribed chats.")]
    List,
    #[command(description = "resend unnotified posts of the last <days> days.")]
    Resend(String),
    #[command(description = "show posts marked as interesting in the last <days> days.")]
    Interested(String),
    #[command(description = "show this text.")]
    Help,
    #[command(description = "stop the bot so it gets restarted.")]
    Restart,
    #[command(description = "show or change scan parameters.")]
    Config(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    #[error("Incorrect use of command. Needs one digit argument: days")]
    Days,
    #[error("Incorrect number of arguments for this command")]
    ConfigArguments,
    #[error("Error while parsing arguments in posix-shell manner")]
    Quoting,
}

lazy_static! {
    static ref DAYS_REGEX: Regex = Regex::new("^[0-9]+$").unwrap();
}

fn split_args(args: &str) -> Result<Vec<String>, UsageError> {
    shlex::split(args).ok_or(UsageError::Quoting)
}

pub fn parse_days(args: &str) -> Result<u64, UsageError> {
    match split_args(args)?.as_slice() {
        [days] if DAYS_REGEX.is_match(days) => days.parse().map_err(|_| UsageError::Days),
        _ => Err(UsageError::Days),
    }
}

/// UTC time `days` days before `now`, comparable with `Post::created_utc`.
pub fn cutoff(now: DateTime<Utc>, days: u64) -> Option<NaiveDateTime> {
    now.naive_utc().checked_sub_days(Days::new(days))
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct BotState {
    pub subscribers: Arc<Mutex<Subscribers>>,
    pub params: Arc<Mutex<ScanParams>>,
    pub scanner: Arc<dyn Scanner>,
    pub notifier: Arc<Notifier>,
    pub restart: Arc<Notify>,
}

pub async fn execute(
    state: &BotState,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    cmd: Command,
) -> Result<(), RequestError> {
    match cmd {
        Command::Sub => {
            let reply = match state.subscribers.lock().await.add(chat_id).await {
                Ok(_) => messages::subscribed(),
                Err(e) => {
                    log::error!("Failed to save subscribers: {e}");
                    messages::internal_error()
                }
            };
            messenger.send_text(chat_id, reply).await
        }
        Command::Unsub => {
            let reply = match state.subscribers.lock().await.remove(chat_id).await {
                Ok(_) => messages::unsubscribed(),
                Err(e) => {
                    log::error!("Failed to save subscribers: {e}");
                    messages::internal_error()
                }
            };
            messenger.send_text(chat_id, reply).await
        }
        Command::List => {
            let subs = state.subscribers.lock().await.list();
            if subs.is_empty() {
                return messenger.send_text(chat_id, messages::no_subscribers()).await;
            }
            for sub in subs {
                messenger.send_text(chat_id, sub.to_string()).await?;
            }
            Ok(())
        }
        Command::Resend(args) => resend(state, messenger, chat_id, &args).await,
        Command::Interested(args) => interested(state, messenger, chat_id, &args).await,
        Command::Help => {
            let names: Vec<_> = Command::bot_commands()
                .into_iter()
                .map(|c| c.command.trim_start_matches('/').to_string())
                .collect();
            messenger.send_text(chat_id, messages::help(&names)).await
        }
        Command::Restart => {
            messenger.send_text(chat_id, messages::restarting()).await?;
            log::info!("Restart requested from {chat_id}");
            state.restart.notify_one();
            Ok(())
        }
        Command::Config(args) => {
            let reply = match split_args(&args) {
                Ok(args) => config(&mut *state.params.lock().await, &args).await,
                Err(e) => e.to_string(),
            };
            messenger.send_text(chat_id, reply).await
        }
    }
}

/// Resolves `<days>` into the cutoff timestamp, replying with the usage text
/// when the argument is invalid.
async fn window(
    state: &BotState,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    args: &str,
) -> Result<Option<NaiveDateTime>, RequestError> {
    let since = parse_days(args)
        .ok()
        .and_then(|days| cutoff(Utc::now(), days));

    if since.is_none() {
        messenger
            .send_text(chat_id, UsageError::Days.to_string())
            .await?;
    }
    Ok(since)
}

async fn resend(
    state: &BotState,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    args: &str,
) -> Result<(), RequestError> {
    let Some(since) = window(state, messenger, chat_id, args).await? else {
        return Ok(());
    };

    messenger
        .send_text(chat_id, messages::sending_unmarked(&format_timestamp(since)))
        .await?;

    // no cycle runs while these posts are sent and marked
    let _paused = state.notifier.pause().await;
    let posts = match state.scanner.get_unmarked_posts(since).await {
        Ok(posts) => posts,
        Err(e) => {
            log::error!("Scanner error: {e}");
            return messenger.send_text(chat_id, messages::internal_error()).await;
        }
    };
    log::debug!("Unmarked posts {}", posts.len());

    for post in &posts {
        if !prompt::fits_callback_data(&post.id) {
            log::error!("Post id {} is too long for prompt buttons, skipping", post.id);
            continue;
        }
        send_prompt(messenger, state.scanner.as_ref(), chat_id, post).await?;
        if let Err(e) = state.scanner.mark_post_as_notified(&post.id).await {
            log::error!("Couldn't mark post {} as notified: {e}", post.id);
        }
    }
    Ok(())
}

async fn interested(
    state: &BotState,
    messenger: &dyn Messenger,
    chat_id: ChatId,
    args: &str,
) -> Result<(), RequestError> {
    let Some(since) = window(state, messenger, chat_id, args).await? else {
        return Ok(());
    };

    messenger
        .send_text(chat_id, messages::sending_interested(&format_timestamp(since)))
        .await?;

    let posts = match state.scanner.get_interested_posts(since).await {
        Ok(posts) => posts,
        Err(e) => {
            log::error!("Scanner error: {e}");
            return messenger.send_text(chat_id, messages::internal_error()).await;
        }
    };
    log::debug!("Interested posts {}", posts.len());

    for post in &posts {
        let msg = state.scanner.get_post_message(post);
        messenger.send_post(chat_id, msg, None).await?;
    }
    Ok(())
}

const OP_ADD: &str = "add";
const OP_DEL: &str = "del";

/// Shows or edits the scan parameters and returns the reply text.
async fn config(params: &mut ScanParams, args: &[String]) -> String {
    let result = match args {
        [] => return messages::current_config(&params.render()),
        [key, value] | [key, value, _] => {
            let is_list = match params.get(key) {
                Some(value) => matches!(value, ParamValue::List(_)),
                None => return scan_params::Error::UnknownKey(key.clone()).to_string(),
            };

            match (is_list, args) {
                (false, _) => params
                    .set(key, value)
                    .await
                    .map(|change| messages::config_updated(key, &change)),
                (true, [_, op, element]) if op == OP_ADD => params
                    .add(key, element)
                    .await
                    .map(|list| messages::list_updated(&list)),
                (true, [_, op, element]) if op == OP_DEL => params
                    .remove(key, element)
                    .await
                    .map(|list| messages::list_updated(&list)),
                (true, [_, op, _]) => return messages::unknown_operation(op),
                (true, _) => Err(scan_params::Error::IsList(key.clone())),
            }
        }
        _ => return UsageError::ConfigArguments.to_string(),
    };

    match result {
        Ok(reply) => reply,
        Err(scan_params::Error::Storage(e)) => {
            log::error!("Failed to save scan parameters: {e}");
            messages::internal_error()
        }
        Err(e) => e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use teloxide::utils::command::BotCommands as _;

    use super::*;
    use crate::testing::{post, MemoryScanner, RecordingMessenger};

    struct Fixture {
        state: BotState,
        scanner: Arc<MemoryScanner>,
        _dir: tempfile::TempDir,
    }

    async fn fixture(posts: Vec<crate::scanner::Post>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let params_path = dir.path().join("scan_params.json");
        std::fs::write(
            &params_path,
            r#"{"max_posts": 10, "subreddit": "rust", "keywords": ["tokio"]}"#,
        )
        .unwrap();

        let scanner = Arc::new(MemoryScanner::with_posts(posts));
        let subscribers = Arc::new(Mutex::new(
            Subscribers::load(dir.path().join("subs.json")).await.unwrap(),
        ));
        let state = BotState {
            subscribers: subscribers.clone(),
            params: Arc::new(Mutex::new(ScanParams::load(&params_path).await.unwrap())),
            scanner: scanner.clone(),
            notifier: Arc::new(Notifier::new(scanner.clone(), subscribers)),
            restart: Arc::new(Notify::new()),
        };

        Fixture {
            state,
            scanner,
            _dir: dir,
        }
    }

    fn post_aged(id: &str, title: &str, age: Duration) -> crate::scanner::Post {
        let mut p = post(id, title);
        p.created_utc = format_timestamp((Utc::now() - age).naive_utc());
        p
    }

    fn recent_post(id: &str, title: &str) -> crate::scanner::Post {
        post_aged(id, title, Duration::zero())
    }

    async fn run(f: &Fixture, messenger: &RecordingMessenger, chat: i64, cmd: Command) {
        execute(&f.state, messenger, ChatId(chat), cmd).await.unwrap();
    }

    async fn config_reply(f: &Fixture, args: &[&str]) -> String {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        config(&mut *f.state.params.lock().await, &args).await
    }

    #[test]
    fn days_must_be_a_single_number() {
        assert_eq!(parse_days("3"), Ok(3));
        assert_eq!(parse_days(" 0 "), Ok(0));
        assert_eq!(parse_days(""), Err(UsageError::Days));
        assert_eq!(parse_days("-1"), Err(UsageError::Days));
        assert_eq!(parse_days("3 4"), Err(UsageError::Days));
        assert_eq!(parse_days("three"), Err(UsageError::Days));
        assert_eq!(parse_days("99999999999999999999999"), Err(UsageError::Days));
    }

    #[test]
    fn cutoff_is_now_minus_days_in_utc() {
        let now = Utc.with_ymd_and_hms(2024, 7, 5, 14, 30, 15).unwrap();
        let since = cutoff(now, 7).unwrap();
        assert_eq!(format_timestamp(since), "2024-06-28 14:30:15");
        assert_eq!(format_timestamp(cutoff(now, 0).unwrap()), "2024-07-05 14:30:15");
    }

    #[tokio::test]
    async fn resend_window_counts_whole_days_in_utc() {
        let f = fixture(vec![
            post_aged("in", "Inside", Duration::hours(23)),
            post_aged("out", "Outside", Duration::hours(25)),
        ])
        .await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 1, Command::Resend("1".into())).await;

        let buttons: Vec<_> = messenger.sent().into_iter().map(|s| s.buttons).collect();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[1], ["Yes-in", "No-in"]);
        assert_eq!(*f.scanner.notified_calls.lock().unwrap(), ["in"]);
    }

    #[tokio::test]
    async fn resend_waits_for_a_running_cycle() {
        let f = fixture(vec![recent_post("1", "One")]).await;
        let messenger = Arc::new(RecordingMessenger::default());

        let paused = f.state.notifier.pause().await;
        let mut resend = {
            let state = f.state.clone();
            let messenger = messenger.clone();
            tokio::spawn(async move {
                execute(&state, messenger.as_ref(), ChatId(1), Command::Resend("1".into()))
                    .await
                    .unwrap()
            })
        };

        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(50), &mut resend)
                .await
                .is_err()
        );
        assert_eq!(messenger.sent().len(), 1);
        assert!(f.scanner.notified_calls.lock().unwrap().is_empty());

        drop(paused);
        resend.await.unwrap();
        assert_eq!(messenger.sent().len(), 2);
        assert_eq!(*f.scanner.notified_calls.lock().unwrap(), ["1"]);
    }

    #[tokio::test]
    async fn sub_unsub_and_list() {
        let f = fixture(vec![]).await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 100, Command::Sub).await;
        run(&f, &messenger, 200, Command::Sub).await;
        run(&f, &messenger, 300, Command::List).await;
        run(&f, &messenger, 200, Command::Unsub).await;
        run(&f, &messenger, 200, Command::Unsub).await;

        assert_eq!(messenger.texts_to(ChatId(100)), ["You're now subscribed!"]);
        assert_eq!(messenger.texts_to(ChatId(300)), ["100", "200"]);
        assert_eq!(
            messenger.texts_to(ChatId(200)),
            [
                "You're now subscribed!",
                "You're no longer subscribed! :(",
                "You're no longer subscribed! :("
            ]
        );
        assert_eq!(f.state.subscribers.lock().await.list(), [ChatId(100)]);
    }

    #[tokio::test]
    async fn help_lists_registered_commands() {
        let f = fixture(vec![]).await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 1, Command::Help).await;

        let help = &messenger.texts_to(ChatId(1))[0];
        for name in ["sub", "unsub", "list", "resend", "interested", "help", "restart", "config"] {
            assert!(help.lines().any(|l| l == name), "{name} missing in {help}");
        }
    }

    #[tokio::test]
    async fn restart_acknowledges_and_signals() {
        let f = fixture(vec![]).await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 1, Command::Restart).await;

        assert_eq!(messenger.texts_to(ChatId(1)), ["Bot is restarting"]);
        tokio::time::timeout(std::time::Duration::from_secs(1), f.state.restart.notified())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resend_prompts_only_the_requester_and_marks() {
        let f = fixture(vec![recent_post("1", "One"), recent_post("2", "Two")]).await;
        let messenger = RecordingMessenger::default();
        run(&f, &messenger, 100, Command::Sub).await;

        run(&f, &messenger, 200, Command::Resend("2".into())).await;

        let sent = messenger.sent();
        let to_requester: Vec<_> = sent.iter().filter(|s| s.chat_id == ChatId(200)).collect();
        assert_eq!(to_requester.len(), 3);
        assert!(to_requester[0]
            .text
            .starts_with("Sending notifications of unmarked posts since "));
        assert_eq!(to_requester[1].buttons, ["Yes-1", "No-1"]);
        assert_eq!(to_requester[2].buttons, ["Yes-2", "No-2"]);
        assert_eq!(messenger.texts_to(ChatId(100)).len(), 1);
        assert_eq!(*f.scanner.notified_calls.lock().unwrap(), ["1", "2"]);
    }

    #[tokio::test]
    async fn bad_days_never_reach_the_scanner() {
        let f = fixture(vec![recent_post("1", "One")]).await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 1, Command::Resend("two".into())).await;
        run(&f, &messenger, 1, Command::Interested("".into())).await;

        assert_eq!(
            messenger.texts_to(ChatId(1)),
            [UsageError::Days.to_string(), UsageError::Days.to_string()]
        );
        assert!(f.scanner.windows.lock().unwrap().is_empty());
        assert!(f.scanner.notified_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn interested_sends_plain_posts_without_marking() {
        let mut liked = recent_post("1", "Liked");
        liked.interested = Some(true);
        let f = fixture(vec![liked, recent_post("2", "Other")]).await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 1, Command::Interested("1".into())).await;

        let sent = messenger.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].text.contains("Liked"));
        assert!(sent[1].buttons.is_empty());
        assert!(f.scanner.notified_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn config_without_arguments_dumps_parameters() {
        let f = fixture(vec![]).await;

        let reply = config_reply(&f, &[]).await;
        assert!(reply.starts_with("Current config:\n {"));
        assert!(reply.contains("\"max_posts\": 10"));
    }

    #[tokio::test]
    async fn config_scalar_updates_keep_their_type() {
        let f = fixture(vec![]).await;

        assert_eq!(
            config_reply(&f, &["max_posts", "20"]).await,
            "Argument max_posts has been updated to 20 from 10"
        );
        assert_eq!(f.state.params.lock().await.int("max_posts"), Some(20));

        let reply = config_reply(&f, &["max_posts", "many"]).await;
        assert_eq!(reply, "Argument max_posts needs an integer, got many");
        assert_eq!(f.state.params.lock().await.int("max_posts"), Some(20));
    }

    #[tokio::test]
    async fn config_list_operations() {
        let f = fixture(vec![]).await;

        assert_eq!(
            config_reply(&f, &["keywords", "add", "serde"]).await,
            r#"List has been correctly updated ["tokio", "serde"]"#
        );
        assert_eq!(
            config_reply(&f, &["keywords", "del", "serde"]).await,
            r#"List has been correctly updated ["tokio"]"#
        );
        assert_eq!(
            config_reply(&f, &["keywords", "pop", "serde"]).await,
            "Unknown operation: pop. Available operations: add/del"
        );
        assert_eq!(
            config_reply(&f, &["keywords", "serde"]).await,
            "Argument keywords is a list! Need operation add/del before value"
        );
        assert_eq!(
            config_reply(&f, &["keywords", "del", "diesel"]).await,
            "Value diesel is not in list keywords"
        );
        assert_eq!(f.state.params.lock().await.list("keywords").unwrap(), ["tokio"]);
    }

    #[tokio::test]
    async fn config_rejects_bad_arity_and_keys() {
        let f = fixture(vec![]).await;

        assert_eq!(
            config_reply(&f, &["max_posts"]).await,
            "Incorrect number of arguments for this command"
        );
        assert_eq!(
            config_reply(&f, &["a", "b", "c", "d"]).await,
            "Incorrect number of arguments for this command"
        );
        assert_eq!(config_reply(&f, &["nope", "1"]).await, "Unknown argument: nope");
    }

    #[tokio::test]
    async fn config_command_splits_quoted_arguments() {
        let f = fixture(vec![]).await;
        let messenger = RecordingMessenger::default();

        run(&f, &messenger, 1, Command::Config(r#"keywords add "async rust""#.into())).await;
        run(&f, &messenger, 1, Command::Config(r#"keywords add "open"#.into())).await;

        assert_eq!(
            messenger.texts_to(ChatId(1)),
            [
                r#"List has been correctly updated ["tokio", "async rust"]"#.to_string(),
                UsageError::Quoting.to_string()
            ]
        );
    }

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(
            Command::parse("/resend 3", "notifier_bot").unwrap(),
            Command::Resend("3".into())
        );
        assert_eq!(
            Command::parse("/config keywords add x", "notifier_bot").unwrap(),
            Command::Config("keywords add x".into())
        );
        assert_eq!(Command::parse("/sub", "notifier_bot").unwrap(), Command::Sub);
    }
}
