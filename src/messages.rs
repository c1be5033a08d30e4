use teloxide::utils::html::{bold, escape, link};

use crate::scan_params::{Change, ParamValue};
use crate::scanner::Post;

/// Telegram rejects messages over 4096 characters; leave room for the header lines.
const MAX_BODY_CHARS: usize = 3000;

pub fn post(post: &Post) -> String {
    let mut result = bold(&escape(&post.title));

    let body = post.body.trim();
    if !body.is_empty() {
        result += "\n\n";
        if body.chars().count() > MAX_BODY_CHARS {
            let truncated: String = body.chars().take(MAX_BODY_CHARS).collect();
            result += &escape(&truncated);
            result += "…";
        } else {
            result += &escape(body);
        }
    }

    result += "\n";
    if post.over_18 {
        result += "\n🔞 NSFW";
    }
    if let Some(location) = &post.location {
        result += &format!("\n📍 {}", escape(location));
    }
    if let Some(age) = post.age {
        result += &format!("\n🎂 {age}");
    }
    if let Some(flair) = &post.flair {
        result += &format!("\n🏷 {}", escape(flair));
    }
    if !post.author.is_empty() {
        result += &format!("\n👤 {}", escape(&post.author));
    }
    result += &format!("\n🕒 {}", escape(&post.created_utc));

    if let Some(permalink) = &post.permalink {
        result += "\n\n";
        result += &link(permalink, "Open post");
    }

    result
}

pub fn subscribed() -> String {
    "You're now subscribed!".to_string()
}

pub fn unsubscribed() -> String {
    "You're no longer subscribed! :(".to_string()
}

pub fn no_subscribers() -> String {
    "Nobody is subscribed.".to_string()
}

pub fn restarting() -> String {
    "Bot is restarting".to_string()
}

pub fn help(commands: &[String]) -> String {
    format!("Avaliable commands:\n{}", commands.join("\n"))
}

pub fn sending_unmarked(since: &str) -> String {
    format!("Sending notifications of unmarked posts since {since}")
}

pub fn sending_interested(since: &str) -> String {
    format!("Sending notifications of interested posts since {since}")
}

pub fn current_config(rendered: &str) -> String {
    format!("Current config:\n {rendered}")
}

pub fn config_updated(key: &str, change: &Change) -> String {
    format!(
        "Argument {key} has been updated to {} from {}",
        change.new, change.old
    )
}

pub fn list_updated(list: &ParamValue) -> String {
    format!("List has been correctly updated {list}")
}

pub fn unknown_operation(operation: &str) -> String {
    format!("Unknown operation: {operation}. Available operations: add/del")
}

pub fn interest_updated(interested: bool) -> String {
    let value = if interested { "True" } else { "False" };
    format!("Interested status of post has been succesfully updated to: {value}")
}

pub fn invalid_button() -> String {
    "This button is not valid anymore.".to_string()
}

pub fn unknown_post() -> String {
    "This post does not exist anymore.".to_string()
}

pub fn internal_error() -> String {
    "Sorry, an internal error occurred :((".to_string()
}
