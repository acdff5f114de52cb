//! 用户实体
//!
//! 用户由仓储持有，其余组件只按 `UserId` 引用。

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{Timestamp, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// 邮箱，唯一；早期账号可能为空
    pub mail: Option<String>,
    /// 账号级封禁标记，由阈值升级写入、由自动解封任务清除
    pub is_blocked: bool,
    pub blocked_until: Option<Timestamp>,
    pub last_online: Timestamp,
    /// 头像对象键（图片内容的 md5 十六进制串）
    pub profile_picture: Option<String>,
    pub bio: String,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id,
            username: username.into(),
            mail: None,
            is_blocked: false,
            blocked_until: None,
            last_online: now,
            profile_picture: None,
            bio: String::new(),
        }
    }

    /// 账号级封禁是否已到期（到期后等待清扫任务清除）
    pub fn block_expired(&self, now: Timestamp) -> bool {
        match (self.is_blocked, self.blocked_until) {
            (true, Some(until)) => now >= until,
            _ => false,
        }
    }

    /// 头像在对象存储中的键
    pub fn profile_object_key(&self) -> Option<String> {
        self.profile_picture
            .as_deref()
            .filter(|stem| !stem.is_empty())
            .map(profile_object_key)
    }
}

/// 用户可自行修改的资料
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileUpdate {
    mail: String,
    username: String,
    bio: String,
}

impl ProfileUpdate {
    pub const MAX_USERNAME_LEN: usize = 64;
    pub const MAX_BIO_LEN: usize = 1024;

    pub fn new(
        mail: impl Into<String>,
        username: impl Into<String>,
        bio: impl Into<String>,
    ) -> DomainResult<Self> {
        let mail = mail.into().trim().to_string();
        let username = username.into().trim().to_string();
        let bio = bio.into();

        let mail_ok = mail
            .split_once('@')
            .is_some_and(|(local, host)| !local.is_empty() && !host.is_empty());
        if !mail_ok {
            return Err(DomainError::validation_error("Mail", "invalid mail address"));
        }
        if username.is_empty() || username.chars().count() > Self::MAX_USERNAME_LEN {
            return Err(DomainError::validation_error(
                "UserName",
                format!("must be 1..={} characters", Self::MAX_USERNAME_LEN),
            ));
        }
        if bio.chars().count() > Self::MAX_BIO_LEN {
            return Err(DomainError::validation_error("Bio", "too long"));
        }

        Ok(Self {
            mail,
            username,
            bio,
        })
    }

    pub fn mail(&self) -> &str {
        &self.mail
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn bio(&self) -> &str {
        &self.bio
    }

    pub fn apply(&self, user: &mut User) {
        user.mail = Some(self.mail.clone());
        user.username = self.username.clone();
        user.bio = self.bio.clone();
    }
}

/// 由内容哈希得到头像对象键
pub fn profile_object_key(stem: &str) -> String {
    format!("{stem}.jpg")
}
