use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use pkcs8::der::pem::LineEnding;
use tracing::debug;

use sigfactory::use_cases::{decrypt_data, fetch_auth_certificate, fetch_certificate, sign_digest};
use sigfactory::{
    open_backend, Credential, CredentialSession, FactoryConfig, Mechanism, Role, SignatureBackend,
    TokenDirectory, TokenIndex, TokenKeyInfo,
};

#[derive(Parser, Debug)]
#[command(name = "sigfac")]
#[command(about = "Sign and decrypt with hardware tokens, key containers and key stores", version)]
pub struct Cli {
    /// Factory configuration file (TOML)
    #[arg(long, short, env = "SIGFAC_CONFIG", default_value = "sigfactory.toml")]
    pub config: PathBuf,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the key slots of the configured backend
    List {
        /// Only keys usable in this role (signing, authentication)
        #[arg(long)]
        role: Option<Role>,
    },

    /// List the names of the tokens holding the keys
    Names,

    /// Hash data from stdin and write the raw signature to stdout
    Sign {
        /// Token index as printed by `list`
        #[arg(long)]
        token: usize,

        /// Signature mechanism, e.g. rsa-sha256 or ecdsa-sha384
        #[arg(long, default_value = "rsa-sha256")]
        mechanism: Mechanism,

        /// PIN or password of the token
        #[arg(long, env = "SIGFAC_PIN", hide_env_values = true)]
        pin: String,
    },

    /// Decrypt ciphertext from stdin with an authentication key
    Decrypt {
        #[arg(long)]
        token: usize,

        #[arg(long, env = "SIGFAC_PIN", hide_env_values = true)]
        pin: String,
    },

    /// Print the certificate of a token
    Cert {
        #[arg(long)]
        token: usize,

        /// Print the authentication certificate of the token instead
        #[arg(long)]
        auth: bool,

        /// Print DER as hex instead of PEM
        #[arg(long)]
        hex: bool,

        /// Needed only when the directory carries no certificate
        #[arg(long, env = "SIGFAC_PIN", hide_env_values = true)]
        pin: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(io::stderr)
        .init();

    let config = FactoryConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    debug!(backend = %config.backend_type(), "configuration loaded");

    let mut backend = open_backend(&config).context("failed to open backend")?;
    let result = run(cli.command, backend.as_mut());
    backend.close_session().context("failed to close backend")?;
    result
}

fn run(command: Commands, backend: &mut dyn SignatureBackend) -> anyhow::Result<()> {
    match command {
        Commands::List { role } => {
            let tokens = match role {
                Some(role) => backend.list_tokens_by_role(role)?,
                None => backend.list_all_tokens()?,
            };
            for info in &tokens {
                println!("{}", describe(info));
            }
        }

        Commands::Names => {
            for name in backend.list_available_token_names()? {
                println!("{name}");
            }
        }

        Commands::Sign {
            token,
            mechanism,
            pin,
        } => {
            let credential = Credential::new(pin)?;
            let mut data = Vec::new();
            io::stdin().read_to_end(&mut data)?;
            let digest = mechanism.hash.digest(&data);

            let signature = sign_digest(backend, TokenIndex(token), &credential, &digest, mechanism)
                .context("signing failed")?;
            io::stdout().write_all(&signature)?;
        }

        Commands::Decrypt { token, pin } => {
            let credential = Credential::new(pin)?;
            let mut ciphertext = Vec::new();
            io::stdin().read_to_end(&mut ciphertext)?;

            let plaintext = decrypt_data(backend, TokenIndex(token), &credential, &ciphertext)
                .context("decryption failed")?;
            io::stdout().write_all(&plaintext)?;
        }

        Commands::Cert {
            token,
            auth,
            hex,
            pin,
        } => {
            let credential = pin.map(Credential::new).transpose()?;
            let token = TokenIndex(token);
            let certificate = if auth {
                fetch_auth_certificate(backend, token, credential.as_ref())
            } else {
                fetch_certificate(backend, token, Role::Signing, credential.as_ref())
            }
            .context("certificate unavailable")?;

            if hex {
                println!("{}", hex::encode(certificate.as_der()));
            } else {
                let pem = pkcs8::der::pem::encode_string(
                    "CERTIFICATE",
                    LineEnding::LF,
                    certificate.as_der(),
                )
                .map_err(|e| anyhow::anyhow!("PEM encoding failed: {e}"))?;
                print!("{pem}");
            }
        }
    }

    Ok(())
}

fn describe(info: &TokenKeyInfo) -> String {
    let mut roles = Vec::new();
    if info.can_sign {
        roles.push("sign");
    }
    if info.can_authenticate {
        roles.push("auth");
    }
    format!(
        "{}\t{}\t{}\t{}",
        info.index.get(),
        info.token_name,
        info.label,
        roles.join(",")
    )
}
