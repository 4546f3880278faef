//! Guessing game message handler.

use super::parser::{parse, Command, Request};
use crate::protocol::{encode, STATUS_END, STATUS_ERROR, STATUS_OK};
use crate::runtime::{ConnectionInfo, HandlerError, MessageHandler, OutboundAction};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::debug;

const INFO: &[u8] = b"Welcome to the Guessing game!\n\
Type START to begin playing, then type GUESS and a number to make a guess, \
after which I will tell you how you've fared. If you win, you get nothing. \
You can type PLAYERS at any time to see how many other players are connected \
to the game. Have fun!";

/// A running game.
#[derive(Debug, Clone, Copy)]
struct Game {
    target: i64,
    peer: SocketAddr,
}

/// One game per connection, keyed by connection id.
pub struct GuessingGame {
    games: HashMap<usize, Game>,
    rng: StdRng,
}

impl GuessingGame {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic targets, for tests and replays.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            games: HashMap::new(),
            rng,
        }
    }

    fn players(&self) -> Vec<u8> {
        let mut players: Vec<(usize, SocketAddr)> =
            self.games.iter().map(|(&id, game)| (id, game.peer)).collect();
        players.sort_unstable();

        let mut out = b"Players:".to_vec();
        for (_, peer) in players {
            out.extend_from_slice(format!("\n- {}", peer).as_bytes());
        }
        out
    }

    fn handle(&mut self, conn: &ConnectionInfo, request: Request) -> (u32, Vec<u8>) {
        match request.command {
            Command::Quit => {
                self.games.remove(&conn.id);
                return (STATUS_END, b"Goodbye!".to_vec());
            }
            Command::Info => return (STATUS_OK, INFO.to_vec()),
            Command::Players => return (STATUS_OK, self.players()),
            _ => {}
        }

        let Some(game) = self.games.get(&conn.id).copied() else {
            if request.command == Command::Start {
                let target = self.rng.random_range(0..=100);
                self.games.insert(
                    conn.id,
                    Game {
                        target,
                        peer: conn.peer,
                    },
                );
                debug!(conn_id = conn.id, target, "Game started");
                return (STATUS_OK, b"Ok.".to_vec());
            }
            return (
                STATUS_ERROR,
                b"Game not started. (INFO/HELP for more info).".to_vec(),
            );
        };

        match (request.command, request.value) {
            (Command::Guess, Some(guess)) if guess < game.target => {
                (STATUS_OK, b"You guessed too low.".to_vec())
            }
            (Command::Guess, Some(guess)) if guess > game.target => {
                (STATUS_OK, b"You guessed too high.".to_vec())
            }
            (Command::Guess, Some(_)) => {
                self.games.remove(&conn.id);
                (
                    STATUS_OK,
                    b"Congratulations, you won a meaningless game.".to_vec(),
                )
            }
            _ => (STATUS_ERROR, b"Invalid command.".to_vec()),
        }
    }
}

impl Default for GuessingGame {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageHandler for GuessingGame {
    fn on_init(&mut self) {
        self.games.clear();
    }

    fn on_message(
        &mut self,
        conn: &ConnectionInfo,
        data: &[u8],
    ) -> Result<OutboundAction, HandlerError> {
        let Ok(request) = parse(data) else {
            return Ok(OutboundAction::reply(encode(
                STATUS_ERROR,
                b"Invalid command structure.",
            )));
        };

        let (status, message) = self.handle(conn, request);
        let frame = encode(status, &message);

        if status == STATUS_END {
            Ok(OutboundAction::reply_and_close(frame))
        } else {
            Ok(OutboundAction::reply(frame))
        }
    }

    fn on_close(&mut self, conn: &ConnectionInfo) {
        self.games.remove(&conn.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: usize) -> ConnectionInfo {
        ConnectionInfo {
            id,
            peer: SocketAddr::from(([127, 0, 0, 1], 50000 + id as u16)),
        }
    }

    fn send(game: &mut GuessingGame, id: usize, msg: &[u8]) -> OutboundAction {
        game.on_message(&conn(id), msg).unwrap()
    }

    fn reply(game: &mut GuessingGame, id: usize, msg: &[u8]) -> Vec<u8> {
        let action = send(game, id, msg);
        assert_eq!(action.frames.len(), 1);
        action.frames[0].to_vec()
    }

    fn with_target(game: &mut GuessingGame, id: usize, target: i64) {
        game.games.insert(
            id,
            Game {
                target,
                peer: conn(id).peer,
            },
        );
    }

    #[test]
    fn test_start() {
        let mut game = GuessingGame::with_seed(1);
        assert_eq!(reply(&mut game, 0, b"START"), b"200:Ok.");

        let target = game.games[&0].target;
        assert!((0..=100).contains(&target));
    }

    #[test]
    fn test_guess_hints() {
        let mut game = GuessingGame::with_seed(1);
        with_target(&mut game, 0, 50);

        assert_eq!(reply(&mut game, 0, b"GUESS:40"), b"200:You guessed too low.");
        assert_eq!(reply(&mut game, 0, b"GUESS:60"), b"200:You guessed too high.");
        assert!(game.games.contains_key(&0));

        assert_eq!(
            reply(&mut game, 0, b"GUESS:50"),
            b"200:Congratulations, you won a meaningless game."
        );
        assert!(!game.games.contains_key(&0));
    }

    #[test]
    fn test_zero_is_a_valid_guess() {
        let mut game = GuessingGame::with_seed(1);
        with_target(&mut game, 0, 0);
        assert_eq!(
            reply(&mut game, 0, b"GUESS:0"),
            b"200:Congratulations, you won a meaningless game."
        );
    }

    #[test]
    fn test_game_not_started() {
        let mut game = GuessingGame::with_seed(1);
        assert_eq!(
            reply(&mut game, 0, b"GUESS:5"),
            b"201:Game not started. (INFO/HELP for more info)."
        );
    }

    #[test]
    fn test_invalid_command_in_game() {
        let mut game = GuessingGame::with_seed(1);
        with_target(&mut game, 0, 10);

        assert_eq!(reply(&mut game, 0, b"START"), b"201:Invalid command.");
        assert_eq!(reply(&mut game, 0, b"GUESS"), b"201:Invalid command.");
        assert_eq!(game.games[&0].target, 10);
    }

    #[test]
    fn test_invalid_structure() {
        let mut game = GuessingGame::with_seed(1);
        assert_eq!(
            reply(&mut game, 0, b"GUESS:ten"),
            b"201:Invalid command structure."
        );
        assert_eq!(reply(&mut game, 0, b"A:1:2"), b"201:Invalid command structure.");
    }

    #[test]
    fn test_quit_closes() {
        let mut game = GuessingGame::with_seed(1);
        with_target(&mut game, 0, 10);

        let action = send(&mut game, 0, b"QUIT");
        assert!(action.close);
        assert_eq!(&action.frames[0][..], b"400:Goodbye!");
        assert!(game.games.is_empty());
    }

    #[test]
    fn test_info() {
        let mut game = GuessingGame::with_seed(1);
        let info = reply(&mut game, 0, b"INFO");
        assert!(info.starts_with(b"200:Welcome to the Guessing game!\n"));
        assert_eq!(reply(&mut game, 0, b"HELP"), info);
    }

    #[test]
    fn test_players_lists_active_games() {
        let mut game = GuessingGame::with_seed(1);
        assert_eq!(reply(&mut game, 0, b"PLAYERS"), b"200:Players:");

        with_target(&mut game, 2, 10);
        with_target(&mut game, 1, 10);
        assert_eq!(
            reply(&mut game, 0, b"PLAYERS"),
            b"200:Players:\n- 127.0.0.1:50001\n- 127.0.0.1:50002"
        );
    }

    #[test]
    fn test_games_are_per_connection() {
        let mut game = GuessingGame::with_seed(1);
        with_target(&mut game, 0, 30);

        assert_eq!(
            reply(&mut game, 1, b"GUESS:30"),
            b"201:Game not started. (INFO/HELP for more info)."
        );
        assert_eq!(
            reply(&mut game, 0, b"guess:30\r\n"),
            b"200:Congratulations, you won a meaningless game."
        );
    }

    #[test]
    fn test_close_drops_game() {
        let mut game = GuessingGame::with_seed(1);
        with_target(&mut game, 3, 10);
        game.on_close(&conn(3));
        assert!(game.games.is_empty());
    }
}
