//! Landing page. Static; no data dependency.

const TITLE: &str = "Find Yourself in Every Moment";
const TAGLINE: &str = "Every smile, every dance, every candid laugh from the wedding, found with one selfie.";

const STEPS: [(&str, &str); 3] = [
    ("Upload a selfie", "Take or upload a photo of yourself to start the magic"),
    ("We match your face", "Our AI technology finds you in all the event photos"),
    ("View & download", "Discover and save all your beautiful moments"),
];

pub fn render() -> String {
    let mut out = format!("{TITLE}\n{TAGLINE}\n\nHow it works\n");
    for (n, (title, description)) in STEPS.iter().enumerate() {
        out.push_str(&format!("  {}. {title}\n     {description}\n", n + 1));
    }
    out.push_str("\nPress Enter to take your selfie, or \"q\" to quit.");
    out
}
