use std::fmt;
use std::str::FromStr;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use thiserror::Error;

const DELIMITER: char = '-';

/// Telegram rejects buttons with more callback data than this many bytes.
const MAX_CALLBACK_DATA: usize = 64;

/// Answer given on a confirm-prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Decision::Yes => "Yes",
            Decision::No => "No",
        }
    }

    pub fn interested(self) -> bool {
        self == Decision::Yes
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("callback data has no delimiter")]
    MissingDelimiter,
    #[error("unknown decision `{0}`")]
    UnknownDecision(String),
    #[error("callback data has no post id")]
    MissingPostId,
}

/// Stateless payload of a prompt button: `{decision}-{post id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
    pub decision: Decision,
    pub post_id: String,
}

impl CallbackToken {
    pub fn new(decision: Decision, post_id: &str) -> Self {
        Self {
            decision,
            post_id: post_id.to_string(),
        }
    }
}

impl fmt::Display for CallbackToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.decision.as_str(), self.post_id)
    }
}

impl FromStr for CallbackToken {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // post ids may contain the delimiter themselves, decisions never do
        let (decision, post_id) = s.split_once(DELIMITER).ok_or(ParseError::MissingDelimiter)?;

        let decision = match decision {
            "Yes" => Decision::Yes,
            "No" => Decision::No,
            other => return Err(ParseError::UnknownDecision(other.to_string())),
        };

        if post_id.is_empty() {
            return Err(ParseError::MissingPostId);
        }

        Ok(Self::new(decision, post_id))
    }
}

/// Whether both prompt buttons for `post_id` stay within Telegram's limit.
pub fn fits_callback_data(post_id: &str) -> bool {
    [Decision::Yes, Decision::No]
        .iter()
        .all(|&d| CallbackToken::new(d, post_id).to_string().len() <= MAX_CALLBACK_DATA)
}

/// The two-button keyboard attached to a confirm-prompt for `post_id`.
pub fn keyboard(post_id: &str) -> InlineKeyboardMarkup {
    let button = |decision: Decision| {
        InlineKeyboardButton::callback(
            decision.as_str(),
            CallbackToken::new(decision, post_id).to_string(),
        )
    };

    InlineKeyboardMarkup::new(vec![vec![button(Decision::Yes), button(Decision::No)]])
}
