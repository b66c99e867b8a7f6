// SPDX-License-Identifier: Apache-2.0

use crate::backend::{Backend, BACKENDS};

use std::fmt::{self, Formatter};
use std::ops::Deref;

use anyhow::Result;
use clap::Args;
use libc::{uname, utsname};
use serde::Serialize;

/// Show details about backend support on this system
#[derive(Args, Debug)]
pub struct Options {
    #[clap(short, long)]
    /// Emit JSON rather than human-readable output
    json: bool,
}

#[derive(Serialize)]
struct Info<'a> {
    version: &'static str,
    protocol: &'static str,
    system_info: String,
    backends: &'a Vec<Box<dyn Backend>>,
}

impl fmt::Display for Info<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use colorful::*;

        fn get_icon(is_atty: bool, pass: bool) -> String {
            match (is_atty, pass) {
                (true, true) => "✔".green().to_string(),
                (true, false) => "✗".red().to_string(),
                (false, true) => "✔".into(),
                (false, false) => "✗".into(),
            }
        }

        let is_atty = atty::is(atty::Stream::Stdout);

        writeln!(f, "vcryptodev version {}", self.version)?;
        writeln!(f, "cryptoport version {}", self.protocol)?;
        writeln!(f, "System Info: {}", self.system_info)?;

        for backend in self.backends {
            let data = backend.data();
            let icon = get_icon(is_atty, data.iter().all(|x| x.pass));

            writeln!(f, "{} Backend: {}", icon, backend.name())?;

            for datum in &data {
                let icon = get_icon(is_atty, datum.pass);
                write!(f, "  {} {}", icon, datum.name)?;

                if let Some(ref info) = datum.info {
                    write!(f, ": {}", info)?;
                }
                writeln!(f)?;
            }

            for mesg in data.iter().filter_map(|d| d.mesg.as_ref()) {
                writeln!(f, "\n  {}\n", mesg)?;
            }
        }
        Ok(())
    }
}

fn system_info() -> String {
    use std::{ffi::CStr, io, mem::MaybeUninit, os::raw::c_char, str::Utf8Error};

    fn utsname_to_string(mut utsname: utsname) -> Result<String, Utf8Error> {
        fn array_to_str<const N: usize>(array: &'_ mut [c_char; N]) -> Result<&'_ str, Utf8Error> {
            array[N - 1] = 0;
            unsafe { CStr::from_ptr(array.as_ptr()) }.to_str()
        }

        Ok(format!(
            "{} {} {} {}",
            array_to_str(&mut utsname.sysname)?,
            array_to_str(&mut utsname.release)?,
            array_to_str(&mut utsname.version)?,
            array_to_str(&mut utsname.machine)?,
        ))
    }

    let mut utsname = MaybeUninit::uninit();

    if unsafe { uname(utsname.as_mut_ptr()) } != 0 {
        format!("[{}]", io::Error::last_os_error())
    } else {
        utsname_to_string(unsafe { utsname.assume_init() })
            .unwrap_or_else(|e| format!("[utf8 error: {}]", e))
    }
}

impl Options {
    /// Display nicely-formatted info about each backend
    pub fn execute(self) -> Result<()> {
        let info = Info {
            version: env!("CARGO_PKG_VERSION"),
            protocol: cryptoport::VERSION,
            system_info: system_info(),
            backends: BACKENDS.deref(),
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&info)?);
        } else {
            println!("{}", info);
        }

        Ok(())
    }
}
