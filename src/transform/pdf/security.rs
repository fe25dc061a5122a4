//! Password protection.

use async_trait::async_trait;
use lopdf::{Document, EncryptionState, EncryptionVersion, Object, Permissions, StringFormat};

use crate::transform::options::Permission;
use crate::transform::pdf::document::{corrupt, load, save};
use crate::transform::{NamedBuffer, Transform, TransformContext, TransformError, TransformResult};
use crate::validation::ValidatedPayload;

/// RC4 key length in bits.
const KEY_LENGTH: usize = 128;

/// Translate user-facing permission names into PDF permission bits.
///
/// Accessibility extraction is always granted.
pub fn permission_bits(granted: &[Permission]) -> Permissions {
    granted
        .iter()
        .fold(Permissions::COPYABLE_FOR_ACCESSIBILITY, |bits, permission| {
            bits | match permission {
                Permission::Print => Permissions::PRINTABLE | Permissions::PRINTABLE_IN_HIGH_QUALITY,
                Permission::Copy | Permission::Extract => Permissions::COPYABLE,
                Permission::Edit => Permissions::MODIFIABLE | Permissions::FILLABLE,
                Permission::Annotate => Permissions::ANNOTABLE,
                Permission::FillForms => Permissions::FILLABLE,
            }
        })
}

/// Encrypt with `password` as both user and owner password.
pub fn add_password(bytes: &[u8], password: &str, granted: &[Permission]) -> Result<Vec<u8>, TransformError> {
    if password.is_empty() {
        return Err(TransformError::invalid("Password must not be empty"));
    }
    let mut doc = load(bytes)?;
    ensure_file_id(&mut doc);
    if doc.version.as_str() < "1.4" {
        doc.version = "1.4".to_string();
    }

    let state = EncryptionState::try_from(EncryptionVersion::V2 {
        document: &doc,
        owner_password: password,
        user_password: password,
        key_length: KEY_LENGTH,
        permissions: permission_bits(granted),
    })
    .map_err(|_| TransformError::invalid("Password contains unsupported characters"))?;

    doc.encrypt(&state)
        .map_err(|_| TransformError::failure("Failed to encrypt PDF"))?;
    save(&mut doc)
}

/// Decrypt with `password`; unencrypted input is returned re-saved.
pub fn remove_password(bytes: &[u8], password: &str) -> Result<Vec<u8>, TransformError> {
    let mut doc = match Document::load_mem_with_password(bytes, password) {
        Ok(doc) => doc,
        Err(lopdf::Error::InvalidPassword) => return Err(TransformError::IncorrectCredential),
        Err(_) => return Err(corrupt()),
    };
    if doc.is_encrypted() {
        return Err(TransformError::IncorrectCredential);
    }
    doc.encryption_state = None;
    save(&mut doc)
}

/// Encryption keys are derived from the first file identifier.
fn ensure_file_id(doc: &mut Document) {
    let has_id = doc
        .trailer
        .get(b"ID")
        .and_then(Object::as_array)
        .is_ok_and(|ids| !ids.is_empty());
    if !has_id {
        let id = uuid::Uuid::new_v4().as_bytes().to_vec();
        doc.trailer.set(
            "ID",
            vec![
                Object::String(id.clone(), StringFormat::Hexadecimal),
                Object::String(id, StringFormat::Hexadecimal),
            ],
        );
    }
}

pub struct AddPassword;

#[async_trait]
impl Transform for AddPassword {
    type Input = ValidatedPayload;
    type Options = (String, Vec<Permission>);

    fn operation(&self) -> &'static str {
        "password_add"
    }

    async fn run(
        &self,
        ctx: &TransformContext<'_>,
        input: Self::Input,
        (password, granted): Self::Options,
    ) -> Result<TransformResult, TransformError> {
        let bytes = ctx
            .blocking(move || add_password(input.bytes(), &password, &granted))
            .await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("protected.pdf", bytes)))
    }
}

pub struct RemovePassword;

#[async_trait]
impl Transform for RemovePassword {
    type Input = ValidatedPayload;
    type Options = String;

    fn operation(&self) -> &'static str {
        "password_remove"
    }

    async fn run(&self, ctx: &TransformContext<'_>, input: Self::Input, password: String) -> Result<TransformResult, TransformError> {
        let bytes = ctx.blocking(move || remove_password(input.bytes(), &password)).await?;
        Ok(TransformResult::Single(NamedBuffer::pdf("unlocked.pdf", bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::pdf::document::page_count;
    use crate::transform::pdf::fixtures::sample;

    #[test]
    fn protected_documents_need_the_password() {
        let protected = add_password(&sample(2), "s3cret", &[Permission::Print]).unwrap();
        assert!(protected.starts_with(b"%PDF-"));

        let err = page_count(&protected).unwrap_err();
        assert_eq!(err.to_string(), "PDF is password protected. Remove the password first.");

        let err = remove_password(&protected, "wrong").unwrap_err();
        assert!(matches!(err, TransformError::IncorrectCredential));

        let unlocked = remove_password(&protected, "s3cret").unwrap();
        assert_eq!(page_count(&unlocked).unwrap(), 2);
    }

    #[test]
    fn empty_password_is_rejected() {
        assert!(matches!(
            add_password(&sample(1), "", &[]),
            Err(TransformError::InvalidParameter(_))
        ));
    }

    #[test]
    fn permission_mapping() {
        let none = permission_bits(&[]);
        assert_eq!(none, Permissions::COPYABLE_FOR_ACCESSIBILITY);

        let print = permission_bits(&[Permission::Print]);
        assert!(print.contains(Permissions::PRINTABLE | Permissions::PRINTABLE_IN_HIGH_QUALITY));
        assert!(!print.contains(Permissions::COPYABLE));
    }
}
