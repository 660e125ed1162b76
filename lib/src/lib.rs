mod consensus;
mod evaluate;
mod game;
mod parse;
mod prompt;
mod proposer;
mod puzzle;
mod results;
mod solver;
mod validator;

pub use consensus::*;
pub use evaluate::*;
pub use game::*;
pub use parse::parse_reply;
pub use prompt::*;
pub use proposer::*;
pub use puzzle::*;
pub use results::*;
pub use solver::*;
pub use validator::check_guess;
