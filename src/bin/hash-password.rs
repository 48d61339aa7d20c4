/**
 * Admin Credential Helper
 * Produces the bcrypt hash the server expects in ADMIN_HASH_PASSWORD.
 * The password can be passed as the first argument or piped on stdin,
 * which keeps it out of shell history.
 */
use bcrypt::{hash, verify, DEFAULT_COST};
use std::io::{self, Read};

fn env_line(hashed: &str) -> String {
    format!("ADMIN_HASH_PASSWORD={}", hashed)
}

fn read_password() -> Option<String> {
    if let Some(arg) = std::env::args().nth(1) {
        return Some(arg);
    }

    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf).ok()?;
    let password = buf.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        None
    } else {
        Some(password)
    }
}

fn main() {
    let Some(password) = read_password() else {
        eprintln!("Usage: hash-password <PASSWORD>");
        eprintln!("   or: echo -n <PASSWORD> | hash-password");
        std::process::exit(1);
    };

    let hashed = match hash(&password, DEFAULT_COST) {
        Ok(hashed) => hashed,
        Err(e) => {
            eprintln!("Failed to hash password: {}", e);
            std::process::exit(1);
        }
    };

    // Round-trip before printing so a bad hash never lands in an .env file.
    if !verify(&password, &hashed).unwrap_or(false) {
        eprintln!("Hash verification failed, refusing to print it");
        std::process::exit(1);
    }

    println!("bcrypt cost {}", DEFAULT_COST);
    println!();
    println!("Add this line to the server's .env:");
    println!("{}", env_line(&hashed));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_line_names_the_expected_variable() {
        let line = env_line("$2b$12$abc");
        assert_eq!(line, "ADMIN_HASH_PASSWORD=$2b$12$abc");
    }

    #[test]
    fn test_hash_round_trips_through_verify() {
        let hashed = hash("direction2024", DEFAULT_COST).unwrap();
        assert!(verify("direction2024", &hashed).unwrap());
        assert!(!verify("wrong-password", &hashed).unwrap());
    }
}
