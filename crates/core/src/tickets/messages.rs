//! User-facing texts. The two prompt markers double as prompt detectors and
//! must stay inside the texts that carry them.

use crate::domain::ids::{RoleId, UserId};

pub const OPEN_PROMPT_MARKER: &str = "苦情はこちらのメッセージに";
pub const CLOSE_PROMPT_MARKER: &str = "チケットチャンネルを作成しました";

pub fn open_prompt(open_emoji: &str) -> String {
    format!("{OPEN_PROMPT_MARKER} **{open_emoji}** でリアクションしてください。\n専用の対応チャンネルが作成されます。")
}

pub fn prompt_posted() -> String {
    "苦情受付メッセージを送信しました。".to_owned()
}

pub fn command_requires_role(role_name: &str) -> String {
    format!("❌ **エラー:** このコマンドを使用するには、ロール **`{role_name}`** が必要です。")
}

pub fn command_failed() -> String {
    "❌ コマンドの実行中に予期せぬエラーが発生しました。".to_owned()
}

pub fn command_guild_only() -> String {
    "❌ このコマンドはサーバー内でのみ使用できます。".to_owned()
}

pub fn duplicate_ticket(guild_name: &str) -> String {
    format!("⚠️ {guild_name} サーバーで、あなたは既にチケットチャンネルを持っています。")
}

pub fn close_prompt(creator: UserId, admin_role: RoleId, close_emoji: &str) -> String {
    format!(
        "{} 様、{CLOSE_PROMPT_MARKER}。\nこのチャンネルは {} とあなたのみが閲覧できます。\n\n**対応が完了したら、このメッセージに {close_emoji} でリアクションしてチャンネルを削除してください。**",
        creator.mention(),
        admin_role.mention()
    )
}

pub fn channel_creation_forbidden() -> String {
    "❌ チャンネル作成中にエラーが発生しました。".to_owned()
}

pub fn channel_creation_failed() -> String {
    "❌ チャンネル作成中に予期せぬエラーが発生しました。".to_owned()
}

pub fn closing_notice(delay_secs: u64) -> String {
    format!("🔒 チケットクローズが承認されました。**{delay_secs}秒後にこのチャンネルを削除します。**")
}

pub fn channel_deletion_failed() -> String {
    "❌ チャンネル削除中にエラーが発生しました。".to_owned()
}

pub fn close_denied(user: UserId, admin_role_name: &str) -> String {
    format!(
        "❌ {} さん、このチャンネルを削除できるのは{admin_role_name}ロールまたは作成者本人です。",
        user.mention()
    )
}
