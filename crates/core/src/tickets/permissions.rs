use crate::domain::guild::{OverwriteTarget, Permission, PermissionOverwrite};
use crate::domain::ids::{GuildId, RoleId, UserId};

/// Private-channel overwrites: hidden from `@everyone`, open to the creator
/// and the admin role. Computed once at creation time.
pub fn ticket_overwrites(
    guild_id: GuildId,
    creator: UserId,
    admin_role: RoleId,
) -> Vec<PermissionOverwrite> {
    use Permission::{EmbedLinks, ManageChannels, SendMessages, ViewChannel};

    vec![
        PermissionOverwrite {
            target: OverwriteTarget::Role(guild_id.everyone_role()),
            allow: Vec::new(),
            deny: vec![ViewChannel],
        },
        PermissionOverwrite {
            target: OverwriteTarget::Member(creator),
            allow: vec![ViewChannel, SendMessages, EmbedLinks],
            deny: Vec::new(),
        },
        PermissionOverwrite {
            target: OverwriteTarget::Role(admin_role),
            allow: vec![ViewChannel, SendMessages, ManageChannels],
            deny: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::ticket_overwrites;
    use crate::domain::guild::{OverwriteTarget, Permission};
    use crate::domain::ids::{GuildId, RoleId, UserId};

    #[test]
    fn everyone_is_denied_and_creator_and_admin_are_allowed() {
        let overwrites = ticket_overwrites(GuildId(1), UserId(42), RoleId(7));
        assert_eq!(overwrites.len(), 3);

        let everyone = &overwrites[0];
        assert_eq!(everyone.target, OverwriteTarget::Role(RoleId(1)));
        assert_eq!(everyone.deny, vec![Permission::ViewChannel]);
        assert!(everyone.allow.is_empty());

        let creator = &overwrites[1];
        assert_eq!(creator.target, OverwriteTarget::Member(UserId(42)));
        assert!(creator.allow.contains(&Permission::EmbedLinks));
        assert!(!creator.allow.contains(&Permission::ManageChannels));

        let admin = &overwrites[2];
        assert_eq!(admin.target, OverwriteTarget::Role(RoleId(7)));
        assert!(admin.allow.contains(&Permission::ManageChannels));
        assert!(admin.allow.contains(&Permission::SendMessages));
    }
}
