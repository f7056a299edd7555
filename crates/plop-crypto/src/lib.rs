/// Plop credential hashing.
///
/// Passwords are stored as self-describing PHC strings
/// (`$pbkdf2-sha256$i=<rounds>,l=32$<salt>$<hash>`), so verification never
/// needs parameters from anywhere but the stored hash itself.

pub mod password;

pub use password::{HashError, HashParams, PasswordHasher, verify_password};
