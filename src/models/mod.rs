mod memo;
mod recency;
mod server_memo;
mod snapshot;
mod title;

pub use memo::{extract_title, toggle_checkbox, IdName, Memo};
pub use recency::is_more_recent;
pub use server_memo::{ServerMemo, ServerMemoReply};
pub use snapshot::{AccessTime, DualSnapshot};
pub use title::{make_title_list, MemoTitle};
