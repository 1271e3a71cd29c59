use {
    clap::{Parser, Subcommand},
    etherdfs::{
        error::code, io_err, res, router::Reply, Attributes, BiosTicker, Call, Config,
        Dispatcher, ErrorKind, FileHandle, Passthrough, ReceiveSlot, Result, Router,
        SearchContinuation,
    },
    std::{
        fs,
        io::{self, Read, Write},
        path::{Path, PathBuf},
    },
};

mod link;
mod utils;
use crate::{link::RawLink, utils::*};

/// Host open modes
const OPEN_READ: u16 = 0;
const OPEN_READ_WRITE: u16 = 2;

const COPY_CHUNK: usize = 4096;

type Drive = Router<Dispatcher<RawLink, BiosTicker>>;

#[derive(Debug, clap::Parser)]
struct Cli {
    /// Server MAC address (xx:xx:xx:xx:xx:xx), or :: to find it by broadcast
    server: String,

    /// Server drive and local drive letter, e.g. C-F
    mapping: String,

    /// Network interface to use
    #[arg(short, long, default_value = "eth0")]
    interface: String,

    /// Do not print the banner
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a directory (wildcards allowed)
    Dir {
        #[arg(default_value = "*.*")]
        pattern: String,
    },
    /// Print a file
    Type { path: String },
    /// Copy a file from the drive
    Get { path: String, dest: PathBuf },
    /// Copy a file to the drive
    Put { src: PathBuf, path: String },
    /// Make a directory
    Md { path: String },
    /// Remove a directory
    Rd { path: String },
    /// Check that a directory exists
    Cd { path: String },
    /// Delete files (wildcards allowed)
    Del { path: String },
    /// Rename a file or directory
    Ren { from: String, to: String },
    /// Show attributes, size and timestamp
    Attr { path: String },
    /// Show free space
    Free,
}

/// Stands in for the previous handler: nothing else is mapped here
struct NoPrevious;

impl Passthrough for NoPrevious {
    fn chain(&mut self, call: Call) -> Result<Reply> {
        log::debug!("Unclaimed call {:?}", call);
        res!(io_err!(NotFound, "Drive not mapped"))
    }
}

struct Shell {
    drive: Drive,
    letter: u8,
}

impl Shell {
    fn call(&mut self, call: Call) -> Result<Reply> {
        self.drive.call(call, &mut NoPrevious)
    }

    fn path(&self, path: &str) -> Vec<u8> {
        qualify(self.letter, path)
    }

    fn run(&mut self, command: Command) -> Result<()> {
        let cwd = root(self.letter);
        match command {
            Command::Dir { pattern } => self.dir(&self.path(&pattern)),
            Command::Type { path } => {
                let stdout = io::stdout();
                self.copy_out(&self.path(&path), &mut stdout.lock())
                    .map(|_| ())
            }
            Command::Get { path, dest } => {
                let mut out = fs::File::create(&dest)?;
                let file = self.copy_out(&self.path(&path), &mut out)?;
                filetime::set_file_mtime(&dest, file_time(file.timestamp))?;
                Ok(())
            }
            Command::Put { src, path } => self.copy_in(&src, &self.path(&path)),
            Command::Md { path } => self.call(Call::MakeDir { path: &self.path(&path) }).map(|_| ()),
            Command::Rd { path } => self
                .call(Call::RemoveDir {
                    path: &self.path(&path),
                    cwd: &cwd,
                })
                .map(|_| ()),
            Command::Cd { path } => {
                let path = self.path(&path);
                self.call(Call::ChangeDir { path: &path })?;
                println!("{}", String::from_utf8_lossy(&path));
                Ok(())
            }
            Command::Del { path } => self.call(Call::Delete { path: &self.path(&path) }).map(|_| ()),
            Command::Ren { from, to } => self
                .call(Call::Rename {
                    from: &self.path(&from),
                    to: &self.path(&to),
                })
                .map(|_| ()),
            Command::Attr { path } => self.attr(&self.path(&path)),
            Command::Free => match self.call(Call::DiskSpace { cwd: &cwd })? {
                Reply::DiskSpace(space) => {
                    println!(
                        "{} bytes total, {} bytes free",
                        space.total_bytes(),
                        space.free_bytes()
                    );
                    Ok(())
                }
                other => unexpected(other),
            },
        }
    }

    fn dir(&mut self, pattern: &[u8]) -> Result<()> {
        let mut search = SearchContinuation::default();
        let first = self.call(Call::FindFirst {
            cwd: &root(self.letter),
            path: pattern,
            attributes: Attributes::HIDDEN | Attributes::SYSTEM | Attributes::DIRECTORY,
            search: &mut search,
        });

        let mut count = 0;
        let mut next = first;
        loop {
            match next {
                Ok(Reply::Found(entry)) => {
                    println!("{}", listing(&entry));
                    count += 1;
                }
                Ok(other) => return unexpected(other),
                Err(e) if is_end_of_search(&e) => break,
                Err(e) => return Err(e),
            }
            next = self.call(Call::FindNext {
                search: &mut search,
            });
        }
        println!("{} file(s)", count);
        Ok(())
    }

    /// Copy a whole file from the drive into `out`
    fn copy_out<W: Write>(&mut self, path: &[u8], out: &mut W) -> Result<FileHandle> {
        let mut file = FileHandle::with_mode(OPEN_READ);
        self.call(Call::Open {
            path,
            file: &mut file,
        })?;

        let mut buf = [0u8; COPY_CHUNK];
        let copied = loop {
            let n = match self.call(Call::Read {
                file: &mut file,
                buf: &mut buf,
            }) {
                Ok(Reply::Transferred(n)) => n,
                Ok(other) => break unexpected(other),
                Err(e) => break Err(e),
            };
            if n == 0 {
                break Ok(());
            }
            if let Err(e) = out.write_all(&buf[..n]) {
                break Err(e.into());
            }
        };

        self.call(Call::Close { file: &mut file })?;
        copied.map(|_| file)
    }

    /// Copy a local file onto the drive, replacing what is there
    fn copy_in(&mut self, src: &Path, path: &[u8]) -> Result<()> {
        let mut input = fs::File::open(src)?;
        let mut file = FileHandle::with_mode(OPEN_READ_WRITE);
        self.call(Call::Create {
            path,
            file: &mut file,
        })?;

        let mut buf = [0u8; COPY_CHUNK];
        let copied = loop {
            let n = match input.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e.into()),
            };
            match self.call(Call::Write {
                file: &mut file,
                data: &buf[..n],
            }) {
                Ok(Reply::Transferred(written)) if written == n => (),
                Ok(Reply::Transferred(_)) => break res!(io_err!(WriteZero, "Disk full")),
                Ok(other) => break unexpected(other),
                Err(e) => break Err(e),
            }
        };

        self.call(Call::Close { file: &mut file })?;
        copied
    }

    fn attr(&mut self, path: &[u8]) -> Result<()> {
        match self.call(Call::GetAttr { path })? {
            Reply::Attributes(attr) => {
                println!(
                    "{} {} {} {}",
                    attr_string(attr.attributes),
                    attr.size,
                    attr.timestamp,
                    String::from_utf8_lossy(path)
                );
                Ok(())
            }
            other => unexpected(other),
        }
    }
}

/// FINDFIRST on an empty directory fails with "file not found", FINDNEXT
/// past the last entry with "no more files"
fn is_end_of_search(e: &etherdfs::Error) -> bool {
    e.kind() == Some(ErrorKind::Server)
        && matches!(e.code(), code::NO_MORE_FILES | code::FILE_NOT_FOUND)
}

fn unexpected<T>(reply: Reply) -> Result<T> {
    res!(io_err!(Other, format!("Unexpected reply {:?}", reply)))
}

fn ethdfs_main(
    Cli {
        server,
        mapping,
        interface,
        quiet,
        command,
    }: Cli,
) -> Result<i32> {
    let config = Config::new(&server, &mapping)?.with_channel(interface.as_str());

    let slot = ReceiveSlot::new();
    let link = RawLink::open(&interface, slot.clone())?;
    let redir = config.connect(link, BiosTicker::new(), slot)?;

    if !quiet {
        println!(
            "[*] {}: mapped to {}: on {} via {}",
            etherdfs::utils::drive_letter(config.mapping.local),
            etherdfs::utils::drive_letter(config.mapping.remote),
            redir.session().remote,
            interface
        );
    }

    let mut shell = Shell {
        drive: Router::new(redir, config.mapping.local),
        letter: config.mapping.local,
    };
    shell.run(command).and(Ok(0))
}

fn main() {
    env_logger::init();

    let exit_code = ethdfs_main(Cli::parse()).unwrap_or_else(|e| {
        eprintln!("Error: {:?}", e);
        -1
    });

    std::process::exit(exit_code);
}
