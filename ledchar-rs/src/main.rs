fn main() {
    ledchar::cli::run();
}
