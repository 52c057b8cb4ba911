//! Issues a short-lived server certificate signed by the probe's CA.

use clap::Parser;
use std::path::PathBuf;
use std::process::exit;

use mtlsprobe::config::{DEFAULT_ROOT_CA, DEFAULT_SERVER_CERT};
use mtlsprobe::issue::{DEFAULT_CA_KEY, DEFAULT_SERVER_CSR};
use mtlsprobe::{inspect_certificate, CertIssuer, ProbeError};

#[derive(Parser, Debug)]
#[command(version, about = "Signs the server CSR with the probe CA", long_about = None)]
struct Args {
    /// Lifetime of the issued certificate in minutes
    lifetime_minutes: u32,

    /// CA private key (PEM)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CA_KEY)]
    ca_key: PathBuf,

    /// CA certificate (PEM)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_ROOT_CA)]
    root_ca: PathBuf,

    /// Certificate signing request (PEM)
    #[arg(long, value_name = "FILE", default_value = DEFAULT_SERVER_CSR)]
    csr: PathBuf,

    /// Where to write the issued certificate
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_SERVER_CERT)]
    out: PathBuf,
}

fn issue(args: &Args) -> Result<(), ProbeError> {
    let issuer = CertIssuer::load(&args.ca_key, &args.root_ca)?;
    issuer.issue_file(&args.csr, &args.out, args.lifetime_minutes)?;
    let expiry = inspect_certificate(&args.out)?;
    println!("Certificate verified!");
    println!("{} expires at {}", args.out.display(), expiry);
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match issue(&args) {
        Ok(()) => println!("Finished."),
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    }
}
