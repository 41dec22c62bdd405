//! Input rules for registration, profile edits, posts and comments.
//!
//! Each validator collects every problem it finds into [`FieldErrors`] so a
//! client gets all messages in one response.

use email_address::EmailAddress;

use crate::error::{duplicate_message, ApiError, FieldErrors};
use crate::models::{CreateCommentRequest, CreatePostRequest, RegisterRequest, UpdateProfileRequest};
use crate::store::Store;

pub const USERNAME_MAX_LEN: usize = 150;
pub const PASSWORD_MIN_LEN: usize = 6;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";

/// Registration input that passed validation
#[derive(Debug)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Checks format rules and that neither the username nor the email is
/// already registered. The store's unique constraints still back this up.
pub fn validate_registration(req: &RegisterRequest, store: &Store) -> Result<NewAccount, ApiError> {
    let mut errors = FieldErrors::new();

    let username = req.username.as_deref().map(str::trim);
    match username {
        Some(u) => {
            if check_username(u, &mut errors) && store.username_taken(u, None)? {
                errors.add("username", duplicate_message("username"));
            }
        }
        None => errors.add("username", REQUIRED),
    }

    let email = req.email.as_deref().map(str::trim);
    match email {
        Some(e) => {
            if check_email(e, &mut errors) && store.email_taken(e)? {
                errors.add("email", duplicate_message("email"));
            }
        }
        None => errors.add("email", REQUIRED),
    }

    match req.password.as_deref() {
        Some(p) => check_password(p, &mut errors),
        None => errors.add("password", REQUIRED),
    }

    errors.into_result()?;

    Ok(NewAccount {
        username: username.unwrap_or_default().to_string(),
        email: email.unwrap_or_default().to_string(),
        password: req.password.clone().unwrap_or_default(),
    })
}

pub fn validate_profile_update(
    req: &UpdateProfileRequest,
    store: &Store,
    user_id: &str,
) -> Result<(), ApiError> {
    let mut errors = FieldErrors::new();
    if let Some(username) = req.username.as_deref().map(str::trim) {
        if check_username(username, &mut errors) && store.username_taken(username, Some(user_id))? {
            errors.add("username", duplicate_message("username"));
        }
    }
    errors.into_result()
}

/// Returns the caption and the normalized image reference
pub fn validate_post(req: CreatePostRequest) -> Result<(String, Option<String>), ApiError> {
    let image = req
        .image
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());

    if req.caption.trim().is_empty() && image.is_none() {
        return Err(ApiError::Validation(FieldErrors::single(
            "caption",
            "A post needs a caption or an image.",
        )));
    }

    Ok((req.caption, image))
}

/// Returns the comment text
pub fn validate_comment(req: CreateCommentRequest) -> Result<String, ApiError> {
    match req.text {
        None => Err(ApiError::Validation(FieldErrors::single("text", REQUIRED))),
        Some(text) if text.trim().is_empty() => {
            Err(ApiError::Validation(FieldErrors::single("text", BLANK)))
        }
        Some(text) => Ok(text),
    }
}

/// Returns whether the username passed the format rules
fn check_username(username: &str, errors: &mut FieldErrors) -> bool {
    if username.is_empty() {
        errors.add("username", BLANK);
        return false;
    }
    let mut valid = true;
    if username.chars().count() > USERNAME_MAX_LEN {
        errors.add(
            "username",
            format!("Ensure this field has no more than {} characters.", USERNAME_MAX_LEN),
        );
        valid = false;
    }
    if !username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
    {
        errors.add(
            "username",
            "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
        );
        valid = false;
    }
    valid
}

fn check_email(email: &str, errors: &mut FieldErrors) -> bool {
    if email.is_empty() {
        errors.add("email", BLANK);
        false
    } else if !EmailAddress::is_valid(email) {
        errors.add("email", "Enter a valid email address.");
        false
    } else {
        true
    }
}

fn check_password(password: &str, errors: &mut FieldErrors) {
    if password.chars().count() < PASSWORD_MIN_LEN {
        errors.add(
            "password",
            format!("Ensure this field has at least {} characters.", PASSWORD_MIN_LEN),
        );
    }
}
