//! Number guessing game.
//!
//! Each connection may run one game at a time. The server draws a target in
//! 0..=100 on `START` and answers every `GUESS` with a hint until the target
//! is found.
//!
//! ## Protocol Format
//!
//! ```text
//! Request:  COMMAND or COMMAND:VALUE
//!
//! START     -> 200:Ok.
//! GUESS:40  -> 200:You guessed too low.
//! GUESS:50  -> 200:Congratulations, you won a meaningless game.
//! PLAYERS   -> 200:Players:\n- 127.0.0.1:50122
//! INFO/HELP -> 200:<welcome text>
//! QUIT      -> 400:Goodbye!   (connection closes)
//! ```

pub mod handler;
pub mod parser;

pub use handler::GuessingGame;
