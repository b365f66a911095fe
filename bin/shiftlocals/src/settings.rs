use classweave::jvm::{Error, MethodAccessFlags, MethodDescriptor, ParseDescriptor};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

pub struct Settings {
    /// File holding the fragment to inject (`None` for stdin)
    pub fragment_path: Option<PathBuf>,

    /// Access flags of the host method
    ///
    /// Only `ACC_STATIC` matters: without it, slot 0 holds `this`.
    pub host_flags: MethodAccessFlags,

    /// Descriptor of the host method
    ///
    /// The fragment is assumed to come from a method with the same parameters, so it shares the
    /// receiver and parameter slots with the host.
    pub host_descriptor: MethodDescriptor,

    /// Locals the host already allocated past its parameters, before the fragment goes in
    pub host_locals: u16,

    /// Collect elements first and encode them at the end (instead of encoding on the fly)
    pub buffered: bool,

    /// Inject the fragment inside a block
    pub block: bool,
}

impl Settings {
    pub fn new(fragment: &str, host_descriptor: &str, is_static: bool) -> Result<Settings, Error> {
        let fragment_path = if fragment == "-" {
            None
        } else {
            Some(PathBuf::from(fragment))
        };
        let host_flags = if is_static {
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC
        } else {
            MethodAccessFlags::PUBLIC
        };

        Ok(Settings {
            fragment_path,
            host_flags,
            host_descriptor: MethodDescriptor::parse(host_descriptor)?,
            host_locals: 0,
            buffered: false,
            block: false,
        })
    }

    /// Read the fragment source
    pub fn read_fragment(&self) -> io::Result<String> {
        match &self.fragment_path {
            Some(path) => fs::read_to_string(path),
            None => {
                let mut source = String::new();
                io::stdin().read_to_string(&mut source)?;
                Ok(source)
            }
        }
    }
}
