//! CPU81 Emulator - CLI Entry Point
//!
//! Commands:
//! - `cpu81-emu run <image>` - Run a program image until it halts
//! - `cpu81-emu disasm <image>` - Print a disassembly listing
//! - `cpu81-emu debug <image>` - Interactive TUI debugger

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "cpu81-emu")]
#[command(version = "0.1.0")]
#[command(about = "An emulator for the CPU81 8-bit fantasy CPU")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program image until it halts
    Run {
        /// Path to the image: raw binary, or hex text if it ends in .mem
        image: String,
        /// Maximum number of steps to run
        #[arg(short, long, default_value = "1000000")]
        max_cycles: u64,
        /// Show one disassembled line per step
        #[arg(short, long)]
        trace: bool,
        /// Write the final machine state to a JSON file
        #[arg(short, long)]
        snapshot: Option<String>,
    },
    /// Disassemble a program image to readable text
    Disasm {
        /// Path to the image
        image: String,
    },
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the image
        image: String,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run {
            image,
            max_cycles,
            trace,
            snapshot,
        }) => {
            run_program(&image, max_cycles, trace, snapshot.as_deref());
        }
        Some(Commands::Disasm { image }) => {
            disassemble_file(&image);
        }
        #[cfg(feature = "tui")]
        Some(Commands::Debug { image }) => {
            debug_program(&image);
        }
        None => {
            println!("CPU81 Emulator v0.1.0");
            println!("An 8-bit fantasy CPU with predicated execution");
            println!();
            println!("Use --help for available commands");
        }
    }
}

/// Load an image, picking the format from the file extension.
fn load_program(path: &str) -> cpu81::ProgramImage {
    let result = if path.ends_with(".mem") {
        cpu81::load_mem(path)
    } else {
        cpu81::load_image(path)
    };

    match result {
        Ok(image) => {
            if image.is_empty() {
                eprintln!("❌ No instructions to execute");
                std::process::exit(1);
            }
            image
        }
        Err(e) => {
            eprintln!("❌ Failed to load image: {}", e);
            std::process::exit(1);
        }
    }
}

fn run_program(path: &str, max_cycles: u64, trace: bool, snapshot: Option<&str>) {
    use cpu81::{Cpu, StepOutcome};

    println!("🔧 Running: {}", path);

    let image = load_program(path);
    println!("📂 Loaded {} bytes", image.len());

    let mut cpu = Cpu::new();
    cpu.attach_rom(image);
    cpu.attach_output(|port: u8, value: u8| {
        println!("Output to port {}: {}", port, value);
    });

    println!();
    println!("━━━ Execution ━━━");

    while !cpu.is_halted() && cpu.cycles < max_cycles {
        let pc = cpu.regs.pc;

        match cpu.step() {
            Ok(outcome) => {
                if trace {
                    match outcome {
                        StepOutcome::Executed(instr) => {
                            println!(
                                "{:04X}: {:<8} A={:02X} B={:02X} X={:02X} Z={} M={} C={}",
                                pc,
                                instr.to_string(),
                                cpu.regs.a,
                                cpu.regs.b,
                                cpu.regs.x,
                                cpu.flags.zero as u8,
                                cpu.flags.minus as u8,
                                cpu.flags.carry as u8,
                            );
                        }
                        StepOutcome::Skipped(instr) => {
                            println!("{:04X}: {:<8} (skipped)", pc, instr.to_string());
                        }
                        StepOutcome::Halted => {}
                    }
                }
            }
            Err(e) => {
                eprintln!("❌ CPU error at PC={:04X}: {}", pc, e);
                std::process::exit(1);
            }
        }
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Total steps: {}", cpu.cycles);
    println!("Halted: {}", cpu.is_halted());
    println!(
        "A={:02X} B={:02X} X={:02X} PC={:04X}",
        cpu.regs.a, cpu.regs.b, cpu.regs.x, cpu.regs.pc
    );
    println!(
        "Flags: Z={} M={} C={}",
        cpu.flags.zero as u8, cpu.flags.minus as u8, cpu.flags.carry as u8
    );

    let ram_line: Vec<String> = cpu
        .ram
        .dump(0, 32)
        .iter()
        .map(|(_, value)| value.to_string())
        .collect();
    println!("RAM[0-31]: {}", ram_line.join(", "));

    for (port, &value) in cpu.ports.out.iter().enumerate() {
        if value != 0 {
            println!("out[{}] = {}", port, value);
        }
    }

    if !cpu.is_halted() {
        println!();
        println!(
            "⚠️  Reached max cycles limit ({}). Use --max-cycles to increase.",
            max_cycles
        );
    }

    if let Some(out_path) = snapshot {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(json) => {
                if let Err(e) = std::fs::write(out_path, json) {
                    eprintln!("❌ Failed to write snapshot: {}", e);
                    std::process::exit(1);
                }
                println!("✓ Snapshot saved to {}", out_path);
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize snapshot: {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn disassemble_file(path: &str) {
    use cpu81::cpu::decode::decode;
    use cpu81::cpu::Rom;

    println!("📖 Disassembling: {}", path);
    println!();

    let image = load_program(path);

    for addr in 0..image.len() {
        let byte = image.read(addr as u16);
        println!("{:04X}: {:02X}  {}", addr, byte, decode(byte));
    }
}

#[cfg(feature = "tui")]
fn debug_program(path: &str) {
    println!("🔍 Loading: {}", path);

    let image = load_program(path);
    println!("📂 Loaded {} bytes", image.len());

    println!("🚀 Launching debugger...");
    println!();

    if let Err(e) = cpu81::run_debugger(image) {
        eprintln!("❌ Debugger error: {}", e);
        std::process::exit(1);
    }
}
