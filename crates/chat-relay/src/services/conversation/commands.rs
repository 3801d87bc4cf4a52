/// Bot commands understood by the relay. Anything else is chat text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Help,
    Clear,
    Status,
}

impl BotCommand {
    /// Parse a leading `/command` (optionally `/command@botname`).
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.trim_start().split_whitespace().next()?;
        let name = first.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "clear" => Some(Self::Clear),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

pub const WELCOME_TEXT: &str = "Oh, what a surprise! Another seeker of wisdom!\n\n\
Welcome to my cozy little world of pseudo-support. I'm here to help you... \
or at least to create a convincing illusion of help. Tell me about your \
'grand' plans and I'll give you advice you will surely appreciate.\n\n\
Commands:\n\
/help - a detailed guide to my 'talent'\n\
/clear - erase the memory of your 'achievements'\n\
/status - check my brilliant technical condition\n\
/start - begin this fascinating journey all over again";

pub const HELP_TEXT: &str = "A guide to interacting with a genius:\n\n\
It is elementary: you write me your 'unique' problem, and I reply with so \
much enthusiasm that you will feel motivated... or something very much like it.\n\n\
Commands:\n\
/start - restart this thrilling adventure\n\
/help - reread this masterpiece of instructions\n\
/clear - wipe the traces of your 'brilliant' questions\n\
/status - check my brilliant technical condition\n\n\
I remember the last messages of our conversation for an hour of silence, \
then I graciously forget them.";

pub const CLEARED_TEXT: &str = "Dialog history cleared!\n\n\
I have now forgotten all your previous 'achievements'. Feel free to start \
over and impress me with a new level of genius!";

pub const NOTHING_TO_CLEAR_TEXT: &str = "There is nothing to clear!\n\n\
You had no history to begin with. Apparently even the memory of your \
messages evaporated from sheer... uniqueness.";

pub const TEXT_ONLY_TEXT: &str = "Oh, a media file! How interesting... \
But I specialize in text and images. Send me words or a picture and I'll happily \
appreciate them with sarcasm.";

pub const NOT_AN_IMAGE_TEXT: &str = "Oh, a document! How interesting... \
But I only look at images. Send me a picture and I'll analyze it with due sarcasm.";

pub const IMAGE_TOO_LARGE_TEXT: &str = "What a monumental picture! Sadly it is too big \
even for my boundless talent. Try something under 10MB.";
