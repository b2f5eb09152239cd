//! Telegram message handling.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{Me, ParseMode, ReplyParameters};
use tracing::{info, warn};

use crate::commands::{route, Command, Route};
use crate::context::{preview, BotContext};
use crate::reply::{ThreadPicker, Trigger, HELP_TEXT, START_TEXT};

pub async fn handle_new_message(
    bot: Bot,
    me: Me,
    msg: Message,
    ctx: Arc<BotContext>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let name = msg
        .from
        .as_ref()
        .map(|u| u.first_name.as_str())
        .or_else(|| msg.chat.first_name());

    let mut picker = ThreadPicker;

    let outcome = match route(text, me.username()) {
        Route::Ignore => return Ok(()),
        Route::Command(Command::Start) => Ok(Some(START_TEXT.to_string())),
        Route::Command(Command::Help) => Ok(Some(HELP_TEXT.to_string())),
        Route::Command(Command::Check) => {
            info!("🔍 /check from {}", name.unwrap_or("?"));
            ctx.assess(text, name, Trigger::Command, &mut picker).await
        }
        Route::Command(Command::Complete) => {
            info!("✍️ completion request from {}", name.unwrap_or("?"));
            ctx.complete(text, name, &mut picker).await.map(Some)
        }
        Route::Passive => ctx.assess(text, name, Trigger::Passive, &mut picker).await,
    };

    match outcome {
        Ok(Some(reply)) => send_reply(&bot, &msg, &reply).await,
        Ok(None) => Ok(()),
        Err(e) => {
            warn!("Failed to handle \"{}\": {e}", preview(text));
            send_plain(&bot, &msg, e.user_message()).await
        }
    }
}

/// Reply with Markdown, retrying as plain text if Telegram rejects the markup
/// (e.g. an unbalanced `_` in the echoed message).
async fn send_reply(bot: &Bot, msg: &Message, reply: &str) -> ResponseResult<()> {
    let sent = bot
        .send_message(msg.chat.id, reply)
        .parse_mode(reply_parse_mode())
        .reply_parameters(ReplyParameters::new(msg.id))
        .await;

    match sent {
        Ok(_) => Ok(()),
        Err(teloxide::RequestError::Api(e)) => {
            warn!("Markdown reply rejected ({e}), sending plain text");
            send_plain(bot, msg, reply).await
        }
        Err(e) => Err(e),
    }
}

/// Legacy Markdown: the echo only uses a single `_` pair, and MarkdownV2
/// would require escaping every reserved character in user text.
#[allow(deprecated)]
fn reply_parse_mode() -> ParseMode {
    ParseMode::Markdown
}

async fn send_plain(bot: &Bot, msg: &Message, text: &str) -> ResponseResult<()> {
    bot.send_message(msg.chat.id, text)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}
