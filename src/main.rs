fn main() {
    glycare_lib::run()
}
