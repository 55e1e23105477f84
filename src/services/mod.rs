pub mod batch_decryption;
pub mod crypto_utils;
pub mod key_integrity;
pub mod key_manager;
pub mod sealed_message_manager;
pub mod submission_crypto;
pub mod utils;
