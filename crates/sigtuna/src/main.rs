#![forbid(unsafe_code)]

//! Sigtuna CLI — XML Encryption operations (encrypt, decrypt).

use clap::{Parser, Subcommand};
use sigtuna_core::{algorithm, Error};
use sigtuna_crypto::AlgorithmRegistry;
use sigtuna_enc::marshal::marshal_encrypted_data;
use sigtuna_enc::{
    parse_document, DataEncryptionParameters, Decrypter, DecryptionParameters, Encrypter,
    EncryptionParameters, KeyEncryptionParameters,
};
use sigtuna_keys::{Credential, CredentialResolver, KeyMaterial};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "sigtuna",
    about = "Sigtuna — XML Encryption (XML-Enc) for Rust",
    version
)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt an XML document into an EncryptedData element
    Encrypt {
        /// Input XML file
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Data encryption algorithm URI
        #[arg(long = "data-algorithm",
              default_value = "http://www.w3.org/2009/xmlenc11#aes256-gcm")]
        data_algorithm: String,

        /// Key encryption algorithm URI (defaults to kw-aes* for raw keys,
        /// rsa-oaep-mgf1p for RSA keys)
        #[arg(long = "key-algorithm")]
        key_algorithm: Option<String>,

        /// Raw symmetric key file (binary)
        #[arg(short = 'k', long)]
        key: Option<PathBuf>,

        /// RSA public key (PEM, PKCS#8 or PKCS#1)
        #[arg(long = "rsa-public")]
        rsa_public: Option<PathBuf>,

        /// Name recorded for the key (KeyName)
        #[arg(long = "key-name")]
        key_name: Option<String>,

        /// Recipient attribute stamped on the produced EncryptedKey
        #[arg(long)]
        recipient: Option<String>,

        /// Encrypt only the content of the root element
        #[arg(long)]
        content: bool,
    },

    /// Decrypt the first EncryptedData in an XML document
    Decrypt {
        /// Input XML file
        file: PathBuf,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Raw symmetric key files (binary); tried as data keys and KEKs
        #[arg(short = 'k', long)]
        key: Vec<PathBuf>,

        /// Named raw symmetric key (NAME:FILE)
        #[arg(long = "key-name")]
        key_name: Vec<String>,

        /// RSA private key (PEM, PKCS#8 or PKCS#1)
        #[arg(long = "rsa-private")]
        rsa_private: Option<PathBuf>,

        /// Acceptable Recipient values (empty accepts all)
        #[arg(long)]
        recipient: Vec<String>,

        /// Re-root the decrypted fragment as an independent document
        #[arg(long)]
        rooted: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("sigtuna: {e}");
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Error> {
    match command {
        Commands::Encrypt {
            file,
            output,
            data_algorithm,
            key_algorithm,
            key,
            rsa_public,
            key_name,
            recipient,
            content,
        } => {
            let xml = std::fs::read_to_string(&file)?;
            let params = build_encryption_params(
                &data_algorithm,
                key_algorithm.as_deref(),
                key.as_deref(),
                rsa_public.as_deref(),
                key_name.as_deref(),
                recipient,
            )?;

            let encrypter = Encrypter::new(AlgorithmRegistry::default());
            let encrypted = if content {
                encrypter.encrypt_content(&xml, &params)?
            } else {
                encrypter.encrypt_element(&xml, &params)?
            };
            write_output(output.as_deref(), marshal_encrypted_data(&encrypted).as_bytes())
        }

        Commands::Decrypt {
            file,
            output,
            key,
            key_name,
            rsa_private,
            recipient,
            rooted,
        } => {
            let xml = std::fs::read_to_string(&file)?;
            let parsed = parse_document(&xml)?;

            let mut kek_store = CredentialResolver::new();
            let mut dparams_data = Vec::new();
            for path in &key {
                let credential = Arc::new(Credential::new(KeyMaterial::Symmetric(
                    std::fs::read(path)?,
                )));
                dparams_data.push(Arc::clone(&credential));
                kek_store.add(credential);
            }
            for spec in &key_name {
                let (name, path) = spec.split_once(':').ok_or_else(|| {
                    Error::Config(format!("--key-name expects NAME:FILE, got '{spec}'"))
                })?;
                let credential = Arc::new(
                    Credential::new(KeyMaterial::Symmetric(std::fs::read(path)?))
                        .with_name(name),
                );
                dparams_data.push(Arc::clone(&credential));
                kek_store.add(credential);
            }
            if let Some(path) = &rsa_private {
                kek_store.add(load_rsa_private(path)?);
            }

            let mut dparams = DecryptionParameters::new(kek_store);
            dparams.data_credentials = dparams_data;
            dparams.recipients = recipient.into_iter().collect();

            let decrypter = Decrypter::new(AlgorithmRegistry::default(), dparams);
            let plaintext = if rooted {
                decrypter
                    .decrypt_data_rooted(&parsed.encrypted_data, Some(&parsed.key_index))?
                    .into_bytes()
            } else {
                decrypter.decrypt_data(&parsed.encrypted_data, Some(&parsed.key_index))?
            };
            write_output(output.as_deref(), &plaintext)
        }
    }
}

fn build_encryption_params(
    data_algorithm: &str,
    key_algorithm: Option<&str>,
    key: Option<&Path>,
    rsa_public: Option<&Path>,
    key_name: Option<&str>,
    recipient: Option<String>,
) -> Result<EncryptionParameters, Error> {
    let mut data = DataEncryptionParameters::new(data_algorithm);
    let mut keys = Vec::new();

    match (key, rsa_public) {
        (Some(path), None) => {
            let bytes = std::fs::read(path)?;
            let mut credential = Credential::new(KeyMaterial::Symmetric(bytes.clone()));
            if let Some(name) = key_name {
                credential = credential.with_name(name);
            }
            let credential = Arc::new(credential);

            match key_algorithm {
                // A wrap algorithm makes the raw key a KEK for a generated
                // session key.
                Some(wrap) => {
                    let mut kp = KeyEncryptionParameters::new(wrap, credential);
                    kp.recipient = recipient;
                    keys.push(kp);
                }
                // Otherwise it is the data encryption key itself.
                None => data = data.with_credential(credential),
            }
        }
        (None, Some(path)) => {
            let transport = key_algorithm.unwrap_or(algorithm::RSA_OAEP_MGF1P);
            let mut credential = load_rsa_public(path)?;
            if let Some(name) = key_name {
                credential = credential.with_name(name);
            }
            let mut kp = KeyEncryptionParameters::new(transport, Arc::new(credential));
            kp.recipient = recipient;
            keys.push(kp);
        }
        (Some(_), Some(_)) => {
            return Err(Error::Config(
                "--key and --rsa-public are mutually exclusive".into(),
            ))
        }
        (None, None) => {
            return Err(Error::Config(
                "either --key or --rsa-public is required".into(),
            ))
        }
    }

    Ok(EncryptionParameters { data, keys })
}

fn load_rsa_public(path: &Path) -> Result<Credential, Error> {
    use rsa::pkcs1::DecodeRsaPublicKey;
    use rsa::pkcs8::DecodePublicKey;

    let pem = std::fs::read_to_string(path)?;
    let public = rsa::RsaPublicKey::from_public_key_pem(&pem)
        .or_else(|_| rsa::RsaPublicKey::from_pkcs1_pem(&pem))
        .map_err(|e| Error::Key(format!("cannot load RSA public key: {e}")))?;
    Ok(Credential::new(KeyMaterial::Rsa {
        private: None,
        public,
    }))
}

fn load_rsa_private(path: &Path) -> Result<Credential, Error> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    let pem = std::fs::read_to_string(path)?;
    let private = rsa::RsaPrivateKey::from_pkcs8_pem(&pem)
        .or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(&pem))
        .map_err(|e| Error::Key(format!("cannot load RSA private key: {e}")))?;
    let public = private.to_public_key();
    Ok(Credential::new(KeyMaterial::Rsa {
        private: Some(private),
        public,
    }))
}

fn write_output(path: Option<&Path>, bytes: &[u8]) -> Result<(), Error> {
    match path {
        Some(path) => std::fs::write(path, bytes)?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(bytes)?;
            std::io::stdout().write_all(b"\n")?;
        }
    }
    Ok(())
}
