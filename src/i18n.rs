use std::collections::HashMap;

const EN: &[(&str, &str)] = &[
    // Help texts
    ("help_about", "Shell command book: import, browse and reuse your shell history"),
    ("help_label_usage", "Usage:"),
    ("help_label_commands", "Commands:"),
    ("help_label_options", "Options:"),
    ("help_browse", "Import new history in the background and open the browser (default)"),
    ("help_import", "Import new commands from the history file once"),
    ("help_list", "Print stored commands"),
    ("help_show", "Show one command in full"),
    ("help_delete", "Delete a command"),
    ("help_compose", "Join several commands into a new bookmarked one"),
    ("help_bookmark", "Bookmark a command"),
    ("help_archive", "Archive a command"),
    ("help_obsolete", "Mark a command obsolete"),
    ("help_edit", "Edit title, description or script (opens $EDITOR without flags)"),
    ("help_lint", "Run shellcheck on a command again"),
    ("help_db_option", "--db <PATH>  Database file"),
    ("help_config_section", "Config (~/.scb/config.toml):"),
    ("help_config_db_path", "storage.db_path: database file (default ~/.scb/commands.db)"),
    ("help_config_history_file", "import.history_file: history file (default $HISTFILE, then ~/.bash_history)"),
    ("help_config_ignore", "import.ignore_patterns: regexes of commands never imported"),
    ("help_config_lint", "import.lint: true | false (lint imported commands with shellcheck)"),
    ("help_config_summary_length", "display.summary_length: width of command summaries in prompts (default 50)"),
    ("help_config_alt_screen", "display.alt_screen: true | false (use alternate screen in the browser; default: false)"),
    ("help_env_section", "Environment:"),
    ("help_env_db", "SHELL_CMD_BOOK_DB: database file, overrides the config"),
    ("help_env_debug", "DEBUG: any value enables debug logging to ~/.scb/logs/scb.log"),
    // Import
    ("import_summary", "Parsed {0} commands: {1} new, {2} already stored, {3} filtered out, {4} skipped, {5} errors"),
    ("import_below_watermark", "{0} commands from before the last import were not examined"),
    ("import_aborted", "Import stopped early: {0}"),
    ("import_running", "Importing history..."),
    ("import_finished", "Import finished: {0} new commands"),
    ("import_failed", "Import failed, see the log"),
    // Commands
    ("no_records", "No commands found"),
    ("deleted_command", "Deleted command #{0}"),
    ("bookmarked_command", "Bookmarked command #{0}"),
    ("archived_command", "Archived command #{0}"),
    ("obsoleted_command", "Marked command #{0} obsolete"),
    ("composed_command", "Created command #{0} from {1} commands"),
    ("edited_command", "Saved command #{0}"),
    ("edit_unchanged", "No changes, command #{0} left as is"),
    ("lint_result", "Command #{0}: lint {1}"),
    ("lint_disabled", "shellcheck not found, lint status set to UNAVAILABLE"),
    ("confirm_delete_prompt", "Delete \"{0}\"? [y/N] "),
    ("delete_aborted", "Aborted"),
    ("total_records", "{0} commands"),
    // Fields
    ("field_id", "ID"),
    ("field_title", "Title"),
    ("field_description", "Description"),
    ("field_status", "Status"),
    ("field_lint", "Lint"),
    ("field_created", "Created"),
    ("field_modified", "Modified"),
    ("field_elapsed", "Elapsed"),
    ("field_script", "Script"),
    // Editor
    ("editor_diff", "Script changes:"),
    // Browser
    ("tui_title", "Command book ({0} commands, {1} selected)"),
    ("tui_filter", "Filter"),
    ("tui_no_matches", "No matches found"),
    ("tui_hint", "j/k ↑/↓=move  /=filter  space=select  Enter=print  c=compose  b=bookmark  e=edit  d=delete  r=reload  Esc=quit"),
    ("tui_filter_hint", "Type to filter, Enter=keep filter, Esc=clear"),
    ("tui_confirm_delete", "Delete \"{0}\"? (y/n)"),
    ("tui_selection_hint", "Select commands with space first"),
    ("warning_interactive_failed", "Warning: cannot enable interactive mode: {0}"),
];

const ZH: &[(&str, &str)] = &[
    // Help texts
    ("help_about", "Shell 命令本：导入、浏览并复用 shell 历史命令"),
    ("help_label_usage", "用法:"),
    ("help_label_commands", "命令:"),
    ("help_label_options", "选项:"),
    ("help_browse", "后台导入新历史并打开浏览界面（默认）"),
    ("help_import", "从历史文件导入一次新命令"),
    ("help_list", "列出已保存的命令"),
    ("help_show", "显示一条命令的完整信息"),
    ("help_delete", "删除一条命令"),
    ("help_compose", "将多条命令合并为一条新的书签命令"),
    ("help_bookmark", "将命令加入书签"),
    ("help_archive", "归档命令"),
    ("help_obsolete", "将命令标记为过时"),
    ("help_edit", "编辑标题、描述或脚本（无参数时打开 $EDITOR）"),
    ("help_lint", "重新用 shellcheck 检查命令"),
    ("help_db_option", "--db <PATH>  数据库文件"),
    ("help_config_section", "配置文件 (~/.scb/config.toml):"),
    ("help_config_db_path", "storage.db_path: 数据库文件（默认 ~/.scb/commands.db）"),
    ("help_config_history_file", "import.history_file: 历史文件（默认 $HISTFILE，其次 ~/.bash_history）"),
    ("help_config_ignore", "import.ignore_patterns: 不导入的命令正则列表"),
    ("help_config_lint", "import.lint: true | false（导入时用 shellcheck 检查）"),
    ("help_config_summary_length", "display.summary_length: 提示中命令摘要的宽度（默认 50）"),
    ("help_config_alt_screen", "display.alt_screen: true | false（浏览界面是否使用备用屏，默认 false）"),
    ("help_env_section", "环境变量:"),
    ("help_env_db", "SHELL_CMD_BOOK_DB: 数据库文件，优先于配置"),
    ("help_env_debug", "DEBUG: 任意值开启调试日志，写入 ~/.scb/logs/scb.log"),
    // Import
    ("import_summary", "解析了 {0} 条命令: 新增 {1}，已存在 {2}，被过滤 {3}，跳过 {4}，错误 {5}"),
    ("import_below_watermark", "{0} 条早于上次导入的命令未被检查"),
    ("import_aborted", "导入提前结束: {0}"),
    ("import_running", "正在导入历史..."),
    ("import_finished", "导入完成: 新增 {0} 条命令"),
    ("import_failed", "导入失败，请查看日志"),
    // Commands
    ("no_records", "没有找到任何命令"),
    ("deleted_command", "已删除命令 #{0}"),
    ("bookmarked_command", "已将命令 #{0} 加入书签"),
    ("archived_command", "已归档命令 #{0}"),
    ("obsoleted_command", "已将命令 #{0} 标记为过时"),
    ("composed_command", "已由 {1} 条命令创建命令 #{0}"),
    ("edited_command", "已保存命令 #{0}"),
    ("edit_unchanged", "没有修改，命令 #{0} 保持不变"),
    ("lint_result", "命令 #{0}: 检查结果 {1}"),
    ("lint_disabled", "未找到 shellcheck，检查状态设为 UNAVAILABLE"),
    ("confirm_delete_prompt", "删除 \"{0}\"? [y/N] "),
    ("delete_aborted", "已取消"),
    ("total_records", "共 {0} 条命令"),
    // Fields
    ("field_id", "编号"),
    ("field_title", "标题"),
    ("field_description", "描述"),
    ("field_status", "状态"),
    ("field_lint", "检查"),
    ("field_created", "创建时间"),
    ("field_modified", "修改时间"),
    ("field_elapsed", "耗时"),
    ("field_script", "脚本"),
    // Editor
    ("editor_diff", "脚本修改:"),
    // Browser
    ("tui_title", "命令本（{0} 条命令，已选 {1} 条）"),
    ("tui_filter", "过滤"),
    ("tui_no_matches", "没有找到匹配的命令"),
    ("tui_hint", "j/k ↑/↓=移动  /=过滤  空格=选择  Enter=输出  c=合并  b=书签  e=编辑  d=删除  r=刷新  Esc=退出"),
    ("tui_filter_hint", "输入以过滤，Enter=保留过滤，Esc=清空"),
    ("tui_confirm_delete", "删除 \"{0}\"? (y/n)"),
    ("tui_selection_hint", "请先用空格选择命令"),
    ("warning_interactive_failed", "警告: 无法启用交互模式: {0}"),
];

pub struct I18n {
    translations: HashMap<&'static str, HashMap<&'static str, &'static str>>,
    current_lang: &'static str,
}

impl I18n {
    pub fn new(lang: &str) -> Self {
        let mut translations = HashMap::new();
        translations.insert("en", EN.iter().copied().collect());
        translations.insert("zh", ZH.iter().copied().collect());

        // 确定语言 - 支持多种语言代码格式
        let lang = lang.to_lowercase();
        let current_lang = if lang.starts_with("zh") || lang == "cn" || lang == "chinese" {
            "zh"
        } else {
            "en"
        };

        Self {
            translations,
            current_lang,
        }
    }

    pub fn t(&self, key: &str) -> String {
        self.translations
            .get(self.current_lang)
            .and_then(|map| map.get(key))
            .map(|value| value.to_string())
            .unwrap_or_else(|| key.to_string())
    }

    pub fn t_format(&self, key: &str, args: &[&str]) -> String {
        let mut result = self.t(key);
        for (i, arg) in args.iter().enumerate() {
            result = result.replace(&format!("{{{}}}", i), arg);
        }
        result
    }
}
