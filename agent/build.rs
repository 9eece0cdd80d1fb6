fn main() {
    #[cfg(windows)]
    {
        let mut res = winres::WindowsResource::new();
        res.set("ProductName", "Interactive Support Agent");
        res.set("FileDescription", "Remote-support agent for interactive session control");
        res.set("InternalName", "interactive-agent");
        if let Err(e) = res.compile() {
            panic!("Failed to compile Windows resources: {}", e);
        }
    }
}
