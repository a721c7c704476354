fn main() -> std::process::ExitCode {
    drugguard_lib::run()
}
