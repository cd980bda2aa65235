use std::path::PathBuf;

use console::Style;
use spexredux_core::calibration::CalibrationProfile;
use spexredux_core::spectrum::{DarkSubtraction, SkippedSource, Spectrum};
use spexredux_core::trace::TraceMethod;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            warning: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!(
        "  {}",
        s.title.apply_to("\u{2550}".repeat(title.chars().count()))
    );
    println!();
}

pub fn print_profile(profile: &CalibrationProfile) {
    let s = Styles::new();
    print_title(&s, "Detector Calibration");
    print_profile_section(&s, profile);
}

fn print_profile_section(s: &Styles, profile: &CalibrationProfile) {
    println!(
        "  {:<16}{}",
        s.label.apply_to("Bias level"),
        s.value.apply_to(format!("{:.2} ADU", profile.bias_level))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Gain"),
        s.value.apply_to(format!("{:.3} e-/ADU", profile.gain))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Read noise"),
        s.value.apply_to(format!("{:.2} e-", profile.read_noise))
    );
    println!(
        "  {:<16}{}",
        s.label.apply_to("Dark current"),
        s.value
            .apply_to(format!("{:.4} e-/s/px", profile.dark_current_rate))
    );
    println!();
}

pub fn print_reduction_summary(
    profile: &CalibrationProfile,
    spectra: &[Spectrum],
    skipped: &[SkippedSource],
    written: &[PathBuf],
) {
    let s = Styles::new();
    print_title(&s, "Night Reduction");
    print_profile_section(&s, profile);

    println!("  {}", s.header.apply_to("Spectra"));
    for (spectrum, path) in spectra.iter().zip(written) {
        println!(
            "    {:<20}{}",
            s.value.apply_to(&spectrum.name),
            s.path.apply_to(path.display())
        );

        if let Some(trace) = &spectrum.provenance.trace {
            let method = match trace.method {
                TraceMethod::Fitted => "gaussian fit",
                TraceMethod::PeakOnly => "profile peak",
                TraceMethod::Fallback(_) => "fallback to peak",
            };
            println!(
                "      {:<14}{} {}",
                s.label.apply_to("Trace"),
                s.value.apply_to(format!(
                    "row {:.2}, width {:.2}",
                    trace.location.center, trace.location.width
                )),
                s.method.apply_to(format!("({method})"))
            );
        }
        if let Some(dark) = &spectrum.provenance.dark {
            let dark = match dark {
                DarkSubtraction::MasterDark { exptime } => format!("master dark {exptime}s"),
                DarkSubtraction::BiasLevel(level) => format!("bias level {level:.2}"),
            };
            println!(
                "      {:<14}{}",
                s.label.apply_to("Dark"),
                s.method.apply_to(dark)
            );
        }
        println!(
            "      {:<14}{}",
            s.label.apply_to("Mean SNR"),
            s.value.apply_to(format!("{:.1}", spectrum.mean_snr()))
        );
        for warning in &spectrum.provenance.warnings {
            println!("      {}", s.warning.apply_to(format!("! {warning}")));
        }
    }

    if !skipped.is_empty() {
        println!("  {}", s.header.apply_to("Skipped"));
        for source in skipped {
            println!("    {}", s.value.apply_to(&source.name));
            for warning in &source.warnings {
                println!("      {}", s.warning.apply_to(format!("! {warning}")));
            }
        }
    }
    println!();
}
