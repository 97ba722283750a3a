pub mod build_cmd;
pub mod genkey_cmd;
pub mod inspect_cmd;
pub mod list_cmd;
pub mod query_cmd;
pub mod validate_cmd;
pub mod verify_cmd;

pub use build_cmd::{cmd_build, BuildArgs};
pub use genkey_cmd::cmd_genkey;
pub use inspect_cmd::cmd_inspect;
pub use list_cmd::{cmd_list, cmd_search_as, ListArgs};
pub use query_cmd::cmd_query;
pub use validate_cmd::cmd_validate;
pub use verify_cmd::cmd_verify;
