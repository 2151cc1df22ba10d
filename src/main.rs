fn main() {
    luapre::cli::run();
}
